//! Bot command handling on top of teloxide's long-polling dispatcher.
//!
//! Only `/start` is answered: it greets the sender with an HTML mention.

use relay_common::config::TelegramConfig;
use relay_notifier::formatter::escape_html;
use teloxide::payloads::SendMessageSetters;
use teloxide::prelude::*;
use teloxide::types::{ParseMode, User};
use teloxide::utils::command::BotCommands;
use tracing::{info, warn};

#[derive(BotCommands, Clone, Debug, PartialEq, Eq)]
#[command(rename_rule = "lowercase")]
pub enum Command {
    #[command(description = "greet the caller")]
    Start,
}

/// Build the command bot against the configured Bot API endpoint.
pub fn bot(config: &TelegramConfig) -> anyhow::Result<Bot> {
    let api_url = reqwest::Url::parse(&config.api_url)?;
    Ok(Bot::new(config.bot_token.clone()).set_api_url(api_url))
}

/// Answer commands until the dispatcher shuts down.
pub async fn run(bot: Bot) {
    info!("Command handler started");
    Command::repl(bot, answer).await;
    info!("Command handler stopped");
}

async fn answer(bot: Bot, msg: Message, cmd: Command) -> ResponseResult<()> {
    match cmd {
        Command::Start => {
            let reply = start_greeting(msg.from.as_ref());
            if let Err(e) = bot
                .send_message(msg.chat.id, reply)
                .parse_mode(ParseMode::Html)
                .await
            {
                warn!(chat_id = msg.chat.id.0, error = %e, "Failed to answer /start");
            }
        }
    }
    Ok(())
}

/// Greeting sent in reply to `/start`.
pub fn start_greeting(user: Option<&User>) -> String {
    match user {
        Some(user) => format!("Привет, {}!\n", mention_html(user)),
        None => "Привет!\n".to_string(),
    }
}

/// HTML link mentioning `user` by full name.
fn mention_html(user: &User) -> String {
    format!(
        "<a href=\"tg://user?id={}\">{}</a>",
        user.id.0,
        escape_html(&user.full_name())
    )
}
