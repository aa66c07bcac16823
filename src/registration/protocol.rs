/// Reply to a successful `REGISTER:<port>`.
pub const REPLY_REGISTERED: &str = "REGISTERED";
/// Reply to `HEARTBEAT`.
pub const REPLY_HEARTBEAT: &str = "ACK";

const REGISTER_PREFIX: &str = "REGISTER:";
const HEARTBEAT: &str = "HEARTBEAT";

/// Datagrams understood by the registration listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationMessage {
    /// `REGISTER:<tcpPort>`
    Register { tcp_port: u16 },
    /// Exactly `HEARTBEAT`.
    Heartbeat,
}

impl RegistrationMessage {
    /// Classifies a datagram. Anything unrecognized or malformed yields `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        let message = raw.trim();

        if let Some(rest) = message.strip_prefix(REGISTER_PREFIX) {
            let port = rest.split(':').next()?.trim();
            return port
                .parse::<u16>()
                .ok()
                .map(|tcp_port| RegistrationMessage::Register { tcp_port });
        }

        if message == HEARTBEAT {
            return Some(RegistrationMessage::Heartbeat);
        }

        None
    }

    pub fn encode(&self) -> String {
        match self {
            RegistrationMessage::Register { tcp_port } => format!("{}{}", REGISTER_PREFIX, tcp_port),
            RegistrationMessage::Heartbeat => HEARTBEAT.to_string(),
        }
    }
}
