//! Raw Ethernet frame transport.

use pnet::datalink::{self, Channel, DataLinkReceiver, DataLinkSender};
use pnet::util::MacAddr;
use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("interface {0} not found")]
    InterfaceNotFound(String),

    #[error("interface {0} has no hardware address")]
    NoHardwareAddress(String),

    #[error("interface {0} does not provide an Ethernet channel")]
    UnsupportedChannel(String),

    #[error("failed to open raw socket on {interface}: {source}")]
    Open {
        interface: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to read frame: {0}")]
    Read(#[source] io::Error),

    #[error("failed to send frame: {0}")]
    Send(#[source] io::Error),

    #[error("transport closed")]
    Closed,
}

/// A blocking source and sink of Ethernet frames.
pub trait FrameTransport: Send {
    /// Hardware address of the listening interface.
    fn hardware_addr(&self) -> MacAddr;

    /// Block until the next frame arrives.
    fn recv(&mut self) -> Result<Vec<u8>, TransportError>;

    fn send(&mut self, frame: &[u8]) -> Result<(), TransportError>;
}

/// Layer 2 channel on a named interface.
pub struct DatalinkTransport {
    interface: String,
    mac: MacAddr,
    tx: Box<dyn DataLinkSender>,
    rx: Box<dyn DataLinkReceiver>,
}

impl DatalinkTransport {
    pub fn open(name: &str) -> Result<Self, TransportError> {
        let interface = datalink::interfaces()
            .into_iter()
            .find(|iface| iface.name == name)
            .ok_or_else(|| TransportError::InterfaceNotFound(name.to_string()))?;

        let mac = interface
            .mac
            .ok_or_else(|| TransportError::NoHardwareAddress(name.to_string()))?;

        match datalink::channel(&interface, datalink::Config::default()) {
            Ok(Channel::Ethernet(tx, rx)) => Ok(Self {
                interface: name.to_string(),
                mac,
                tx,
                rx,
            }),
            Ok(_) => Err(TransportError::UnsupportedChannel(name.to_string())),
            Err(source) => Err(TransportError::Open {
                interface: name.to_string(),
                source,
            }),
        }
    }

    pub fn interface(&self) -> &str {
        &self.interface
    }
}

impl FrameTransport for DatalinkTransport {
    fn hardware_addr(&self) -> MacAddr {
        self.mac
    }

    fn recv(&mut self) -> Result<Vec<u8>, TransportError> {
        self.rx
            .next()
            .map(|frame| frame.to_vec())
            .map_err(TransportError::Read)
    }

    fn send(&mut self, frame: &[u8]) -> Result<(), TransportError> {
        match self.tx.send_to(frame, None) {
            Some(result) => result.map_err(TransportError::Send),
            None => Err(TransportError::Send(io::Error::other("no send buffer available"))),
        }
    }
}
