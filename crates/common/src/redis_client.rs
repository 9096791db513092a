use redis::{Client, Connection};

/// Open a blocking Redis connection for pub/sub use.
///
/// The connection is owned by a single thread for its whole life, so no
/// pooling or async manager is involved.
pub fn open_connection(redis_url: &str) -> redis::RedisResult<Connection> {
    let client = Client::open(redis_url)?;
    let connection = client.get_connection()?;

    tracing::info!("Connected to Redis");
    Ok(connection)
}
