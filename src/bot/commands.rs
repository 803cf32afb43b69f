//! Slash commands answered when the bot is mentioned.
//!
//! `/help` is open to everyone. `/hello` is gated by an [`AccessList`] of
//! user and guild ids; callers outside the list get a refusal reply.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{info, instrument, warn};

use super::openapi::OpenApiClient;
use super::types::{Message, MessageToCreate};
use crate::error::ApiError;
use crate::utils::short_id;

/// `<@123>` / `<@!123>` mention tags.
static MENTION: Lazy<Regex> = Lazy::new(|| Regex::new(r"<@!?\d+>").expect("valid regex"));

/// Reply sent when the caller is not on the access list.
pub const DENIED_REPLY: &str = " You do not have permission to use this command";

/// One side of an access list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Allow {
    /// Every id.
    All,
    /// Only the listed ids.
    Only(HashSet<String>),
}

impl Allow {
    /// Parse a comma-separated id list; `all` admits everyone.
    pub fn parse(list: &str) -> Self {
        if list.trim().eq_ignore_ascii_case("all") {
            return Allow::All;
        }
        Allow::Only(
            list.split(',')
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(str::to_string)
                .collect(),
        )
    }

    fn contains(&self, id: &str) -> bool {
        match self {
            Allow::All => true,
            Allow::Only(ids) => ids.contains(id),
        }
    }
}

/// Who may run restricted commands.
///
/// A caller passes when their user id or their guild id is listed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessList {
    users: Allow,
    guilds: Allow,
}

impl Default for AccessList {
    fn default() -> Self {
        Self::open()
    }
}

impl AccessList {
    /// Everyone passes.
    pub fn open() -> Self {
        Self {
            users: Allow::All,
            guilds: Allow::All,
        }
    }

    /// Build from comma-separated user and guild id lists. Two blank lists
    /// leave the commands open; otherwise a blank side admits nobody.
    pub fn from_lists(users: &str, guilds: &str) -> Self {
        if users.trim().is_empty() && guilds.trim().is_empty() {
            return Self::open();
        }
        Self {
            users: Allow::parse(users),
            guilds: Allow::parse(guilds),
        }
    }

    /// Whether a caller with these ids may run a restricted command.
    pub fn permits(&self, user: Option<&str>, guild: Option<&str>) -> bool {
        if self.users == Allow::All && self.guilds == Allow::All {
            return true;
        }
        let in_users = user.is_some_and(|id| self.users.contains(id));
        let in_guilds = guild.is_some_and(|id| self.guilds.contains(id));
        in_users || in_guilds
    }
}

/// What [`handle_message`] did with a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handled {
    /// Not a known command.
    Ignored,
    /// Command answered.
    Answered,
    /// Caller refused by the access list.
    Denied,
}

/// Known commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `/hello [name...]`
    Hello(String),
    /// `/help`
    Help,
}

impl Command {
    /// Parse message content into a command. Unknown commands yield `None`.
    pub fn parse(content: &str) -> Option<Self> {
        let (name, args) = split_command(content)?;
        match name.as_str() {
            "/hello" => Some(Command::Hello(args.join(" "))),
            "/help" => Some(Command::Help),
            _ => None,
        }
    }

    /// Whether the command is gated by the access list.
    pub fn is_restricted(&self) -> bool {
        matches!(self, Command::Hello(_))
    }

    /// Reply text for the command.
    pub fn reply(&self) -> String {
        match self {
            Command::Hello(name) => format!(" Hello {}", name),
            Command::Help => concat!(
                " Commands:\n",
                "/hello <text>: say hello\n",
                "/help: show this list"
            )
            .to_string(),
        }
    }
}

/// Strip mentions and split into a command word and its arguments.
///
/// Double-quoted arguments keep their inner spaces. An unclosed quote makes
/// the whole message unparseable.
pub fn split_command(content: &str) -> Option<(String, Vec<String>)> {
    let stripped = MENTION.replace_all(content, " ");
    let mut tokens = tokenize(&stripped)?.into_iter();
    let name = tokens.next()?;
    if !name.starts_with('/') {
        return None;
    }
    Some((name, tokens.collect()))
}

fn tokenize(input: &str) -> Option<Vec<String>> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut quoted = false;

    for c in input.chars() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                quoted = true;
            }
            c if c.is_whitespace() && !in_quotes => {
                if !current.is_empty() || quoted {
                    tokens.push(std::mem::take(&mut current));
                }
                quoted = false;
            }
            c => current.push(c),
        }
    }
    if in_quotes {
        return None;
    }
    if !current.is_empty() || quoted {
        tokens.push(current);
    }
    Some(tokens)
}

/// Answer a message if it carries a known command. Every outcome except
/// [`Handled::Ignored`] posts a reply to the source channel.
#[instrument(skip(api, message, access), fields(message_id = %message.id))]
pub async fn handle_message(
    api: &OpenApiClient,
    message: &Message,
    access: &AccessList,
) -> Result<Handled, ApiError> {
    let Some(command) = Command::parse(&message.content) else {
        return Ok(Handled::Ignored);
    };

    let author = message.author.as_ref();
    let user_id = author.map(|a| a.id.as_str());
    let guild_id = message.guild_id.as_deref();

    let (text, handled) = if command.is_restricted() && !access.permits(user_id, guild_id) {
        warn!(
            command = ?command,
            user = user_id.unwrap_or(""),
            guild = guild_id.unwrap_or(""),
            "Command refused"
        );
        (DENIED_REPLY.to_string(), Handled::Denied)
    } else {
        info!(
            command = ?command,
            channel = %short_id(&message.channel_id, 12),
            author = author.map(|a| a.username.as_str()).unwrap_or(""),
            "Answering command"
        );
        (command.reply(), Handled::Answered)
    };

    let reply = MessageToCreate::reply(text, message.id.clone());
    api.post_message(&message.channel_id, &reply).await?;
    Ok(handled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot::intents::Intent;
    use crate::bot::mock::{MockApiConfig, MockApiServer, PostedMessage};
    use crate::bot::types::User;
    use crate::config::BotConfig;
    use pretty_assertions::assert_eq;

    fn bot_config() -> BotConfig {
        BotConfig {
            app_id: "102351684".to_string(),
            token: "test-token".to_string(),
            intents: vec![Intent::PublicGuildMessages],
            sandbox: true,
        }
    }

    fn message(content: &str, user_id: &str, guild_id: &str) -> Message {
        Message {
            id: "msg-1".to_string(),
            channel_id: "chan-1".to_string(),
            guild_id: Some(guild_id.to_string()),
            content: content.to_string(),
            author: Some(User {
                id: user_id.to_string(),
                username: "alice".to_string(),
                avatar: None,
                bot: false,
            }),
            timestamp: None,
        }
    }

    async fn mock_server(fail_posts: bool) -> MockApiServer {
        MockApiServer::start(MockApiConfig {
            fail_posts,
            ..Default::default()
        })
        .await
        .unwrap()
    }

    #[test]
    fn mention_is_stripped_before_parsing() {
        assert_eq!(
            Command::parse("<@!1234567> /hello world"),
            Some(Command::Hello("world".to_string()))
        );
        assert_eq!(
            Command::parse("<@1234567>/help"),
            Some(Command::Help)
        );
    }

    #[test]
    fn hello_without_name_greets_nobody() {
        let command = Command::parse("/hello").unwrap();
        assert_eq!(command.reply(), " Hello ");
    }

    #[test]
    fn hello_joins_arguments() {
        let command = Command::parse("/hello  many   spaced words").unwrap();
        assert_eq!(command.reply(), " Hello many spaced words");
    }

    #[test]
    fn quoted_arguments_keep_spaces() {
        let (name, args) = split_command(r#"/mc lp "say hi there" x"#).unwrap();
        assert_eq!(name, "/mc");
        assert_eq!(args, vec!["lp", "say hi there", "x"]);
    }

    #[test]
    fn empty_quotes_yield_empty_argument() {
        let (_, args) = split_command(r#"/hello """#).unwrap();
        assert_eq!(args, vec![""]);
    }

    #[test]
    fn plain_text_is_not_a_command() {
        assert_eq!(split_command("<@!1> hi there"), None);
        assert_eq!(Command::parse("hello"), None);
        assert_eq!(Command::parse(""), None);
    }

    #[test]
    fn unknown_command_is_ignored() {
        assert_eq!(Command::parse("/launch rockets"), None);
    }

    #[test]
    fn help_lists_commands() {
        let reply = Command::Help.reply();
        assert!(reply.contains("/hello"));
        assert!(reply.contains("/help"));
    }

    #[test]
    fn unclosed_quote_is_not_a_command() {
        assert_eq!(split_command(r#"/hello "unclosed"#), None);
        assert_eq!(Command::parse(r#"<@!1> /hello "a b"#), None);
    }

    #[test]
    fn blank_lists_leave_commands_open() {
        let access = AccessList::from_lists("", " ");
        assert_eq!(access, AccessList::open());
        assert!(access.permits(None, None));
    }

    #[test]
    fn user_or_guild_on_the_list_passes() {
        let access = AccessList::from_lists("840042638", "343331682, 220666756");

        assert!(access.permits(Some("840042638"), Some("1")));
        assert!(access.permits(Some("2"), Some("220666756")));
        assert!(access.permits(None, Some("343331682")));
        assert!(!access.permits(Some("2"), Some("1")));
        assert!(!access.permits(None, None));
    }

    #[test]
    fn all_on_one_side_admits_that_side() {
        let access = AccessList::from_lists("", "all");
        assert!(access.permits(Some("anyone"), Some("any-guild")));
        assert!(!access.permits(Some("anyone"), None));

        let access = AccessList::from_lists("ALL", "all");
        assert!(access.permits(None, None));
    }

    #[test]
    fn only_hello_is_restricted() {
        assert!(Command::Hello(String::new()).is_restricted());
        assert!(!Command::Help.is_restricted());
    }

    #[tokio::test]
    async fn command_reply_is_posted_to_source_channel() {
        let server = mock_server(false).await;
        let api = server.client(&bot_config()).unwrap();

        let handled = handle_message(
            &api,
            &message("<@!9000> /hello world", "840042638", "g-1"),
            &AccessList::open(),
        )
        .await
        .unwrap();

        assert_eq!(handled, Handled::Answered);
        assert_eq!(
            server.posted(),
            vec![PostedMessage {
                channel_id: "chan-1".to_string(),
                content: Some(" Hello world".to_string()),
                msg_id: Some("msg-1".to_string()),
                authorization: Some("Bot 102351684.test-token".to_string()),
            }]
        );
    }

    #[tokio::test]
    async fn caller_outside_access_list_gets_refusal() {
        let server = mock_server(false).await;
        let api = server.client(&bot_config()).unwrap();
        let access = AccessList::from_lists("840042638", "");

        let handled = handle_message(&api, &message("/hello", "555", "g-1"), &access)
            .await
            .unwrap();
        assert_eq!(handled, Handled::Denied);

        let handled = handle_message(&api, &message("/help", "555", "g-1"), &access)
            .await
            .unwrap();
        assert_eq!(handled, Handled::Answered);

        let posted = server.posted();
        assert_eq!(posted.len(), 2);
        assert_eq!(posted[0].content.as_deref(), Some(DENIED_REPLY));
        assert_eq!(posted[0].msg_id.as_deref(), Some("msg-1"));
        assert!(posted[1].content.as_deref().unwrap().contains("/hello"));
    }

    #[tokio::test]
    async fn non_command_posts_nothing() {
        let server = mock_server(false).await;
        let api = server.client(&bot_config()).unwrap();

        let handled = handle_message(&api, &message("just chatting", "1", "g"), &AccessList::open())
            .await
            .unwrap();

        assert_eq!(handled, Handled::Ignored);
        assert!(server.posted().is_empty());
    }

    #[tokio::test]
    async fn rejected_post_surfaces_platform_error() {
        let server = mock_server(true).await;
        let api = server.client(&bot_config()).unwrap();

        let err = tokio_test::assert_err!(
            handle_message(&api, &message("/help", "1", "g"), &AccessList::open()).await
        );
        assert!(matches!(
            err,
            ApiError::Status { status: 403, code: Some(304003), .. }
        ));
    }
}
