//! VICI client over the daemon's Unix socket.
//!
//! # Design Decisions
//! - One request in flight per connection; callers own the client
//!   exclusively (`&mut self`)
//! - Streamed commands register for their event first, collect events until
//!   the command response arrives, then unregister
//! - Events that arrive outside a streamed command are dropped

use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;
use tokio::time;

use crate::monitor::daemon::{DaemonConnector, DaemonError, DaemonResult, DaemonSession, SaSummary};
use crate::vici::codec::{CodecError, Element, Message, Packet, PacketType, MAX_PACKET_LEN};

#[derive(Debug, Error)]
pub enum ViciError {
    #[error("socket error: {0}")]
    Io(#[from] io::Error),

    #[error("malformed packet: {0}")]
    Codec(#[from] CodecError),

    #[error("unexpected {0:?} packet")]
    UnexpectedPacket(PacketType),

    #[error("unknown command {0}")]
    UnknownCommand(String),

    #[error("unknown event {0}")]
    UnknownEvent(String),

    #[error("command {command} failed: {message}")]
    CommandFailed { command: String, message: String },
}

impl From<ViciError> for DaemonError {
    fn from(e: ViciError) -> Self {
        match e {
            ViciError::Io(e) => DaemonError::Unavailable(e.to_string()),
            ViciError::CommandFailed { command, message } => DaemonError::CommandFailed { command, message },
            other => DaemonError::Protocol(other.to_string()),
        }
    }
}

pub struct ViciClient {
    stream: UnixStream,
}

impl ViciClient {
    pub async fn connect(path: impl AsRef<Path>) -> Result<Self, ViciError> {
        let stream = UnixStream::connect(path).await?;
        Ok(Self { stream })
    }

    pub fn from_stream(stream: UnixStream) -> Self {
        Self { stream }
    }

    /// Send a command and wait for its response.
    pub async fn request(&mut self, command: &str, message: Message) -> Result<Message, ViciError> {
        self.write_packet(&Packet::request(command, message)).await?;
        loop {
            let packet = self.read_packet().await?;
            match packet.kind {
                PacketType::CmdResponse => return Ok(packet.message),
                PacketType::CmdUnknown => return Err(ViciError::UnknownCommand(command.to_string())),
                PacketType::Event => continue,
                other => return Err(ViciError::UnexpectedPacket(other)),
            }
        }
    }

    /// Send a command whose results arrive as `event` packets.
    pub async fn stream_request(
        &mut self,
        command: &str,
        event: &str,
        message: Message,
    ) -> Result<(Vec<Message>, Message), ViciError> {
        self.register(PacketType::EventRegister, event).await?;

        self.write_packet(&Packet::request(command, message)).await?;
        let mut events = Vec::new();
        let response = loop {
            let packet = self.read_packet().await?;
            match packet.kind {
                PacketType::Event if packet.name.as_deref() == Some(event) => events.push(packet.message),
                PacketType::Event => continue,
                PacketType::CmdResponse => break packet.message,
                PacketType::CmdUnknown => return Err(ViciError::UnknownCommand(command.to_string())),
                other => return Err(ViciError::UnexpectedPacket(other)),
            }
        };

        self.register(PacketType::EventUnregister, event).await?;
        Ok((events, response))
    }

    /// All IKE SAs, one message per `list-sa` event.
    pub async fn list_sas(&mut self) -> Result<Vec<Message>, ViciError> {
        let (events, _) = self.stream_request("list-sas", "list-sa", Message::new()).await?;
        Ok(events)
    }

    /// Bring up a CHILD_SA by name.
    pub async fn initiate(&mut self, child: &str) -> Result<(), ViciError> {
        let response = self
            .request("initiate", Message::new().with_value("child", child))
            .await?;
        check_success("initiate", &response)
    }

    async fn register(&mut self, kind: PacketType, event: &str) -> Result<(), ViciError> {
        self.write_packet(&Packet::named(kind, event, Message::new())).await?;
        loop {
            let packet = self.read_packet().await?;
            match packet.kind {
                PacketType::EventConfirm => return Ok(()),
                PacketType::EventUnknown => return Err(ViciError::UnknownEvent(event.to_string())),
                PacketType::Event => continue,
                other => return Err(ViciError::UnexpectedPacket(other)),
            }
        }
    }

    async fn write_packet(&mut self, packet: &Packet) -> Result<(), ViciError> {
        let bytes = packet.encode()?;
        self.stream.write_all(&bytes).await?;
        Ok(())
    }

    async fn read_packet(&mut self) -> Result<Packet, ViciError> {
        let len = self.stream.read_u32().await? as usize;
        if len > MAX_PACKET_LEN {
            return Err(CodecError::TooLarge(len).into());
        }
        let mut body = vec![0u8; len];
        self.stream.read_exact(&mut body).await?;
        Ok(Packet::decode(&body)?)
    }
}

fn check_success(command: &str, response: &Message) -> Result<(), ViciError> {
    if response.get_str("success").as_deref() == Some("yes") {
        return Ok(());
    }
    Err(ViciError::CommandFailed {
        command: command.to_string(),
        message: response.get_str("errmsg").unwrap_or_else(|| "unknown error".to_string()),
    })
}

/// Summaries of the IKE SAs in one `list-sa` event.
pub fn sa_summaries(event: &Message) -> Vec<SaSummary> {
    event
        .iter()
        .filter_map(|(name, element)| match element {
            Element::Section(sa) => Some(SaSummary {
                name: name.to_string(),
                remote_host: sa.get_str("remote-host").unwrap_or_default(),
                state: sa.get_str("state").unwrap_or_default(),
            }),
            _ => None,
        })
        .collect()
}

/// Connects to the daemon socket for each reconciliation tick.
#[derive(Debug, Clone)]
pub struct ViciConnector {
    socket_path: PathBuf,
    initiate_timeout: Duration,
}

impl ViciConnector {
    pub fn new(socket_path: impl Into<PathBuf>, initiate_timeout: Duration) -> Self {
        Self {
            socket_path: socket_path.into(),
            initiate_timeout,
        }
    }
}

#[async_trait]
impl DaemonConnector for ViciConnector {
    async fn connect(&self) -> DaemonResult<Box<dyn DaemonSession>> {
        let client = ViciClient::connect(&self.socket_path).await.map_err(|e| {
            DaemonError::Unavailable(format!("{}: {e}", self.socket_path.display()))
        })?;
        Ok(Box::new(ViciSession::new(client, self.initiate_timeout)))
    }
}

struct ViciSession {
    client: ViciClient,
    initiate_timeout: Duration,
    /// Set once a command was abandoned mid-flight; its late response may
    /// still be queued on the socket, so no further command can be trusted.
    abandoned: Option<String>,
}

impl ViciSession {
    fn new(client: ViciClient, initiate_timeout: Duration) -> Self {
        Self {
            client,
            initiate_timeout,
            abandoned: None,
        }
    }

    fn ensure_usable(&self) -> DaemonResult<()> {
        match &self.abandoned {
            Some(command) => Err(DaemonError::Unavailable(format!(
                "session unusable after {command} timed out"
            ))),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl DaemonSession for ViciSession {
    async fn list_sas(&mut self) -> DaemonResult<Vec<SaSummary>> {
        self.ensure_usable()?;
        let events = self.client.list_sas().await?;
        Ok(events.iter().flat_map(sa_summaries).collect())
    }

    async fn initiate(&mut self, child: &str) -> DaemonResult<()> {
        self.ensure_usable()?;
        match time::timeout(self.initiate_timeout, self.client.initiate(child)).await {
            Ok(result) => Ok(result?),
            Err(_) => {
                let command = format!("initiate {child}");
                tracing::warn!(child = %child, timeout = ?self.initiate_timeout, "Abandoning daemon session after timeout");
                self.abandoned = Some(command.clone());
                Err(DaemonError::Timeout(command))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::UnixListener;

    async fn read(stream: &mut UnixStream) -> Packet {
        let len = stream.read_u32().await.unwrap() as usize;
        let mut body = vec![0u8; len];
        stream.read_exact(&mut body).await.unwrap();
        Packet::decode(&body).unwrap()
    }

    async fn write(stream: &mut UnixStream, packet: Packet) {
        stream.write_all(&packet.encode().unwrap()).await.unwrap();
    }

    fn ike_sa(remote: &str) -> Message {
        Message::new().with_value("state", "ESTABLISHED").with_value("remote-host", remote)
    }

    /// Answers `list-sas` with two SAs and `initiate` by child name.
    async fn fake_daemon(listener: UnixListener) {
        let (mut stream, _) = listener.accept().await.unwrap();
        loop {
            let len = match stream.read_u32().await {
                Ok(len) => len as usize,
                Err(_) => return,
            };
            let mut body = vec![0u8; len];
            stream.read_exact(&mut body).await.unwrap();
            let packet = Packet::decode(&body).unwrap();

            match (packet.kind, packet.name.as_deref()) {
                (PacketType::EventRegister | PacketType::EventUnregister, Some("list-sa")) => {
                    write(&mut stream, Packet::unnamed(PacketType::EventConfirm, Message::new())).await;
                }
                (PacketType::CmdRequest, Some("list-sas")) => {
                    for (name, remote) in [("child-192.168.1.2", "192.168.1.2"), ("child-192.168.1.3", "192.168.1.3")] {
                        let event = Message::new().with_section(name, ike_sa(remote));
                        write(&mut stream, Packet::named(PacketType::Event, "list-sa", event)).await;
                    }
                    write(&mut stream, Packet::unnamed(PacketType::CmdResponse, Message::new())).await;
                }
                (PacketType::CmdRequest, Some("initiate")) => {
                    let child = packet.message.get_str("child").unwrap_or_default();
                    let response = if child == "child-192.168.1.4" {
                        Message::new().with_value("success", "yes")
                    } else {
                        Message::new()
                            .with_value("success", "no")
                            .with_value("errmsg", format!("CHILD_SA config '{child}' not found"))
                    };
                    write(&mut stream, Packet::unnamed(PacketType::CmdResponse, response)).await;
                }
                _ => {
                    write(&mut stream, Packet::unnamed(PacketType::CmdUnknown, Message::new())).await;
                }
            }
        }
    }

    #[tokio::test]
    async fn test_list_sas_and_initiate() {
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("charon.vici");
        let listener = UnixListener::bind(&socket).unwrap();
        tokio::spawn(fake_daemon(listener));

        let connector = ViciConnector::new(&socket, Duration::from_secs(5));
        let mut session = connector.connect().await.unwrap();

        let sas = session.list_sas().await.unwrap();
        let remotes: Vec<_> = sas.iter().map(|sa| sa.remote_host.as_str()).collect();
        assert_eq!(remotes, vec!["192.168.1.2", "192.168.1.3"]);
        assert_eq!(sas[0].state, "ESTABLISHED");

        session.initiate("child-192.168.1.4").await.unwrap();
        match session.initiate("child-192.168.1.9").await {
            Err(DaemonError::CommandFailed { command, message }) => {
                assert_eq!(command, "initiate");
                assert!(message.contains("child-192.168.1.9"));
            }
            other => panic!("expected command failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_late_response_after_timeout_is_not_misattributed() {
        let (client_side, mut server_side) = UnixStream::pair().unwrap();
        tokio::spawn(async move {
            let _ = read(&mut server_side).await;
            tokio::time::sleep(Duration::from_millis(300)).await;
            let accepted = Message::new().with_value("success", "yes");
            write(&mut server_side, Packet::unnamed(PacketType::CmdResponse, accepted)).await;

            // Anything still sent on this session is rejected.
            while let Ok(len) = server_side.read_u32().await {
                let mut body = vec![0u8; len as usize];
                if server_side.read_exact(&mut body).await.is_err() {
                    return;
                }
                let rejected = Message::new().with_value("success", "no").with_value("errmsg", "rejected");
                write(&mut server_side, Packet::unnamed(PacketType::CmdResponse, rejected)).await;
            }
        });

        let mut session = ViciSession::new(ViciClient::from_stream(client_side), Duration::from_millis(100));

        assert!(matches!(
            session.initiate("child-192.168.1.2").await,
            Err(DaemonError::Timeout(_))
        ));
        tokio::time::sleep(Duration::from_millis(400)).await;

        assert!(matches!(
            session.initiate("child-192.168.1.3").await,
            Err(DaemonError::Unavailable(_))
        ));
        assert!(matches!(session.list_sas().await, Err(DaemonError::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_unknown_command() {
        let (client_side, mut server_side) = UnixStream::pair().unwrap();
        tokio::spawn(async move {
            let _ = read(&mut server_side).await;
            write(&mut server_side, Packet::unnamed(PacketType::CmdUnknown, Message::new())).await;
        });

        let mut client = ViciClient::from_stream(client_side);
        assert!(matches!(
            client.request("reload-everything", Message::new()).await,
            Err(ViciError::UnknownCommand(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_socket_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let connector = ViciConnector::new(dir.path().join("absent.vici"), Duration::from_secs(1));
        assert!(matches!(connector.connect().await, Err(DaemonError::Unavailable(_))));
    }
}
