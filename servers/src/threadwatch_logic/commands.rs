//! Chat commands: `/start`, `/s <url>` (subscribe) and `/u <url>`
//! (unsubscribe).

use lib_threadwatch::core::SubscriberId;
use lib_threadwatch::ingestors::WatchService;
use lib_threadwatch::{ThreadAddress, WatchError};
use tracing::{debug, warn};

use super::telegram::escape_html;

pub const HELP_TEXT: &str = "Hola! Te notificaré de los hilos que me solicites.\n\n\
Para recibir los mensajes enviados a un hilo, usa el comando /s seguido de la URL del hilo.\n\n\
Para dejar de recibir notificaciones sobre un hilo, usa el comando /u seguido de la URL del hilo.";

const MISSING_SUBSCRIBE_ARG: &str = "Debes especificar un hilo para suscribirte.";
const MISSING_UNSUBSCRIBE_ARG: &str = "Debes especificar un hilo para desuscribirte.";
const INVALID_THREAD: &str = "El hilo que has especificado no es válido.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandKind {
    Start,
    Subscribe,
    Unsubscribe,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub kind: CommandKind,
    pub args: Vec<String>,
}

/// Parses a chat message into a command.
///
/// `/cmd@name` is accepted only when `name` is this bot. Unknown commands and
/// plain text yield `None`.
pub fn parse_command(text: &str, bot_username: Option<&str>) -> Option<Command> {
    let mut words = text.split_whitespace();
    let head = words.next()?.strip_prefix('/')?;

    let (name, target) = match head.split_once('@') {
        Some((name, target)) => (name, Some(target)),
        None => (head, None),
    };
    if let (Some(target), Some(me)) = (target, bot_username) {
        if !target.eq_ignore_ascii_case(me) {
            return None;
        }
    }

    let kind = match name.to_ascii_lowercase().as_str() {
        "start" | "help" => CommandKind::Start,
        "s" => CommandKind::Subscribe,
        "u" => CommandKind::Unsubscribe,
        _ => return None,
    };
    Some(Command {
        kind,
        args: words.map(str::to_string).collect(),
    })
}

/// Checks that `raw` is a thread on the configured forum and returns its
/// canonical address.
pub fn validate_thread(raw: &str, forum_url: &str) -> Option<ThreadAddress> {
    match ThreadAddress::parse(raw) {
        Ok(address) if address.is_on(forum_url) => Some(address),
        Ok(address) => {
            debug!(thread = %address, "rejected thread on another site");
            None
        }
        Err(e) => {
            debug!("rejected thread address: {e}");
            None
        }
    }
}

/// Runs `command` for `chat_id` and returns the HTML reply.
pub async fn handle_command(
    service: &WatchService,
    forum_url: &str,
    chat_id: SubscriberId,
    command: &Command,
) -> String {
    let raw = match (&command.kind, command.args.as_slice()) {
        (CommandKind::Start, _) => return HELP_TEXT.to_string(),
        (_, [raw]) => raw,
        (CommandKind::Subscribe, _) => return MISSING_SUBSCRIBE_ARG.to_string(),
        (CommandKind::Unsubscribe, _) => return MISSING_UNSUBSCRIBE_ARG.to_string(),
    };

    let Some(address) = validate_thread(raw, forum_url) else {
        return INVALID_THREAD.to_string();
    };
    let shown = escape_html(address.as_str());

    match command.kind {
        CommandKind::Subscribe => match service.subscribe(&address, chat_id).await {
            Ok(outcome) if outcome.newly_subscribed => format!("Subscripción exitosa al hilo {shown}"),
            Ok(_) => format!("Ya estabas suscrito al hilo {shown}"),
            Err(WatchError::AuthenticationFailed(e)) => {
                warn!(thread = %address, chat_id, "subscription kept without a poller: {e}");
                format!(
                    "Subscripción registrada al hilo {shown}, pero no he podido iniciar sesión en el foro. \
                     Empezaré a vigilarlo en cuanto sea posible."
                )
            }
            Err(e) => {
                warn!(thread = %address, chat_id, "subscription failed: {e}");
                format!("No he podido suscribirte al hilo {shown}.")
            }
        },
        CommandKind::Unsubscribe => {
            if service.unsubscribe(&address, chat_id).await {
                format!("Desuscripción exitosa al hilo {shown}")
            } else {
                format!("No estabas suscrito al hilo {shown}")
            }
        }
        CommandKind::Start => HELP_TEXT.to_string(),
    }
}
