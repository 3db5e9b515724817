//! Datagram transport to the console
//!
//! The scheduler and ingestor only see the [`Transport`] trait, so tests can
//! swap the UDP socket for an in-memory double.

use std::net::{Ipv4Addr, SocketAddr};

use async_trait::async_trait;
use tokio::net::UdpSocket;
use xair_protocol::message::decode_datagram;
use xair_protocol::{Command, InboundMessage};

use crate::config::SyncConfig;
use crate::error::TransportError;

/// Sends commands to and receives messages from one console
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one command as a single datagram
    async fn send(&self, command: &Command) -> Result<(), TransportError>;

    /// Wait for the next datagram and decode the messages it carries
    ///
    /// Returns an empty list for datagrams that should be ignored.
    async fn recv(&self) -> Result<Vec<InboundMessage>, TransportError>;
}

/// OSC over UDP
#[derive(Debug)]
pub struct UdpTransport {
    socket: UdpSocket,
    console: SocketAddr,
    buffer_size: usize,
}

impl UdpTransport {
    /// Bind the configured local port and target the configured console
    pub async fn bind(config: &SyncConfig) -> Result<Self, TransportError> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, config.local_port)).await?;
        tracing::info!(
            "Bound OSC socket on {} for console {}",
            socket.local_addr()?,
            config.console_addr
        );
        Ok(Self::from_socket(socket, config.console_addr, config.recv_buffer_size))
    }

    /// Wrap an already bound socket
    pub fn from_socket(socket: UdpSocket, console: SocketAddr, buffer_size: usize) -> Self {
        Self {
            socket,
            console,
            buffer_size,
        }
    }

    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        Ok(self.socket.local_addr()?)
    }

    pub fn console_addr(&self) -> SocketAddr {
        self.console
    }
}

#[async_trait]
impl Transport for UdpTransport {
    async fn send(&self, command: &Command) -> Result<(), TransportError> {
        let bytes = command.encode()?;
        self.socket.send_to(&bytes, self.console).await?;
        tracing::trace!("Sent {} to {}", command, self.console);
        Ok(())
    }

    async fn recv(&self) -> Result<Vec<InboundMessage>, TransportError> {
        let mut buf = vec![0u8; self.buffer_size];
        let (len, source) = self.socket.recv_from(&mut buf).await?;

        if source.ip() != self.console.ip() {
            tracing::debug!("Ignoring {} byte datagram from {}", len, source);
            return Ok(Vec::new());
        }

        Ok(decode_datagram(&buf[..len])?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xair_protocol::{ParameterPath, Rate, WireValue};

    async fn loopback_pair() -> (UdpTransport, UdpSocket) {
        let console = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let local = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let transport = UdpTransport::from_socket(local, console.local_addr().unwrap(), 4096);
        (transport, console)
    }

    #[tokio::test]
    async fn test_send_reaches_console() {
        let (transport, console) = loopback_pair().await;
        let command = Command::Subscribe {
            path: ParameterPath::channel_fader(1).unwrap(),
            rate: Rate::from_steps(10),
        };
        transport.send(&command).await.unwrap();

        let mut buf = [0u8; 1024];
        let (len, _) = console.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..len], command.encode().unwrap().as_slice());
    }

    #[tokio::test]
    async fn test_recv_decodes_console_reply() {
        let (transport, console) = loopback_pair().await;
        let reply = Command::Set {
            path: ParameterPath::main_fader(),
            value: xair_protocol::ParameterValue::Normalized(0.5),
        }
        .encode()
        .unwrap();
        console
            .send_to(&reply, transport.local_addr().unwrap())
            .await
            .unwrap();

        let messages = transport.recv().await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].address, "/lr/mix/fader");
        assert_eq!(messages[0].args, vec![WireValue::Float(0.5)]);
    }

    #[tokio::test]
    async fn test_recv_rejects_garbage() {
        let (transport, console) = loopback_pair().await;
        console
            .send_to(b"not osc", transport.local_addr().unwrap())
            .await
            .unwrap();

        assert!(matches!(
            transport.recv().await,
            Err(TransportError::Message(_))
        ));
    }
}
