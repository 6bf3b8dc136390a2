//! Proxy ARP responder.
//!
//! # Responsibilities
//! - Read ARP requests addressed to broadcast or to this interface
//! - Answer with this interface's MAC for addresses on other hosts
//!
//! # Design Decisions
//! - Requests for local or unknown addresses are ignored so the owning
//!   host answers for itself
//! - Transport errors end [`ArpResponder::serve`]; a broken raw socket is
//!   not retried

use pnet::packet::arp::{ArpHardwareTypes, ArpOperations, ArpPacket, MutableArpPacket};
use pnet::packet::ethernet::{EtherTypes, EthernetPacket, MutableEthernetPacket};
use pnet::packet::Packet;
use pnet::util::MacAddr;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;

use crate::arp::transport::{FrameTransport, TransportError};
use crate::observability::metrics;
use crate::store::TopologyStore;

const ETHERNET_HEADER_LEN: usize = 14;
const ARP_PACKET_LEN: usize = 28;

pub struct ArpResponder {
    store: Arc<TopologyStore>,
}

impl ArpResponder {
    pub fn new(store: Arc<TopologyStore>) -> Self {
        Self { store }
    }

    /// Answer requests until the transport fails.
    pub fn serve<T: FrameTransport + ?Sized>(&self, transport: &mut T) -> Result<(), TransportError> {
        let own_mac = transport.hardware_addr();
        tracing::info!(mac = %own_mac, "Listening for ARP requests");

        loop {
            let frame = transport.recv()?;
            if let Some(reply) = self.reply_for(&frame, own_mac) {
                transport.send(&reply)?;
                metrics::record_arp_reply();
            }
        }
    }

    /// The reply frame for `frame`, if it is a request this host should
    /// answer.
    pub fn reply_for(&self, frame: &[u8], own_mac: MacAddr) -> Option<Vec<u8>> {
        proxy_reply(frame, own_mac, |ip| self.store.is_remote(IpAddr::V4(ip)))
    }
}

/// Build a proxy reply for an ARP request when `is_remote` claims the
/// target address.
pub fn proxy_reply(frame: &[u8], own_mac: MacAddr, is_remote: impl Fn(Ipv4Addr) -> bool) -> Option<Vec<u8>> {
    let ethernet = EthernetPacket::new(frame)?;
    if ethernet.get_ethertype() != EtherTypes::Arp {
        return None;
    }

    let destination = ethernet.get_destination();
    if destination != MacAddr::broadcast() && destination != own_mac {
        return None;
    }

    let request = ArpPacket::new(ethernet.payload())?;
    if request.get_operation() != ArpOperations::Request || request.get_protocol_type() != EtherTypes::Ipv4 {
        return None;
    }

    let target_ip = request.get_target_proto_addr();
    tracing::debug!(target = %target_ip, "ARP request");
    if !is_remote(target_ip) {
        return None;
    }

    tracing::debug!(target = %target_ip, "Sending ARP reply");
    Some(build_reply(&request, own_mac, target_ip))
}

fn build_reply(request: &ArpPacket<'_>, own_mac: MacAddr, target_ip: Ipv4Addr) -> Vec<u8> {
    let requester_mac = request.get_sender_hw_addr();
    let requester_ip = request.get_sender_proto_addr();

    let mut frame = vec![0u8; ETHERNET_HEADER_LEN + ARP_PACKET_LEN];

    if let Some(mut ethernet) = MutableEthernetPacket::new(&mut frame) {
        ethernet.set_destination(requester_mac);
        ethernet.set_source(own_mac);
        ethernet.set_ethertype(EtherTypes::Arp);
    }
    if let Some(mut arp) = MutableArpPacket::new(&mut frame[ETHERNET_HEADER_LEN..]) {
        arp.set_hardware_type(ArpHardwareTypes::Ethernet);
        arp.set_protocol_type(EtherTypes::Ipv4);
        arp.set_hw_addr_len(6);
        arp.set_proto_addr_len(4);
        arp.set_operation(ArpOperations::Reply);
        arp.set_sender_hw_addr(own_mac);
        arp.set_sender_proto_addr(target_ip);
        arp.set_target_hw_addr(requester_mac);
        arp.set_target_proto_addr(requester_ip);
    }
    frame
}

#[cfg(test)]
mod tests {
    use super::*;
    use pnet::packet::arp::ArpOperation;

    const OWN_MAC: MacAddr = MacAddr(0x02, 0, 0, 0, 0, 0x01);
    const REQUESTER_MAC: MacAddr = MacAddr(0x02, 0, 0, 0, 0, 0x99);

    fn arp_frame(operation: ArpOperation, destination: MacAddr, target: Ipv4Addr) -> Vec<u8> {
        let mut buffer = vec![0u8; ETHERNET_HEADER_LEN + ARP_PACKET_LEN];
        {
            let mut ethernet = MutableEthernetPacket::new(&mut buffer).unwrap();
            ethernet.set_destination(destination);
            ethernet.set_source(REQUESTER_MAC);
            ethernet.set_ethertype(EtherTypes::Arp);
        }
        {
            let mut arp = MutableArpPacket::new(&mut buffer[ETHERNET_HEADER_LEN..]).unwrap();
            arp.set_hardware_type(ArpHardwareTypes::Ethernet);
            arp.set_protocol_type(EtherTypes::Ipv4);
            arp.set_hw_addr_len(6);
            arp.set_proto_addr_len(4);
            arp.set_operation(operation);
            arp.set_sender_hw_addr(REQUESTER_MAC);
            arp.set_sender_proto_addr(Ipv4Addr::new(10, 42, 0, 10));
            arp.set_target_hw_addr(MacAddr::zero());
            arp.set_target_proto_addr(target);
        }
        buffer
    }

    fn remote(ip: Ipv4Addr) -> bool {
        ip == Ipv4Addr::new(10, 42, 0, 11)
    }

    #[test]
    fn test_reply_for_remote_target() {
        let target = Ipv4Addr::new(10, 42, 0, 11);
        let request = arp_frame(ArpOperations::Request, MacAddr::broadcast(), target);

        let reply = proxy_reply(&request, OWN_MAC, remote).unwrap();
        let ethernet = EthernetPacket::new(&reply).unwrap();
        assert_eq!(ethernet.get_destination(), REQUESTER_MAC);
        assert_eq!(ethernet.get_source(), OWN_MAC);

        let arp = ArpPacket::new(ethernet.payload()).unwrap();
        assert_eq!(arp.get_operation(), ArpOperations::Reply);
        assert_eq!(arp.get_sender_hw_addr(), OWN_MAC);
        assert_eq!(arp.get_sender_proto_addr(), target);
        assert_eq!(arp.get_target_hw_addr(), REQUESTER_MAC);
        assert_eq!(arp.get_target_proto_addr(), Ipv4Addr::new(10, 42, 0, 10));
    }

    #[test]
    fn test_unicast_to_own_mac_is_answered() {
        let request = arp_frame(ArpOperations::Request, OWN_MAC, Ipv4Addr::new(10, 42, 0, 11));
        assert!(proxy_reply(&request, OWN_MAC, remote).is_some());
    }

    #[test]
    fn test_ignores_local_and_unknown_targets() {
        let local = arp_frame(ArpOperations::Request, MacAddr::broadcast(), Ipv4Addr::new(10, 42, 0, 2));
        assert!(proxy_reply(&local, OWN_MAC, remote).is_none());
    }

    #[test]
    fn test_ignores_replies() {
        let reply = arp_frame(ArpOperations::Reply, MacAddr::broadcast(), Ipv4Addr::new(10, 42, 0, 11));
        assert!(proxy_reply(&reply, OWN_MAC, |_| true).is_none());
    }

    #[test]
    fn test_ignores_frames_for_other_hosts() {
        let other = MacAddr(0x02, 0, 0, 0, 0, 0x42);
        let request = arp_frame(ArpOperations::Request, other, Ipv4Addr::new(10, 42, 0, 11));
        assert!(proxy_reply(&request, OWN_MAC, |_| true).is_none());
    }

    #[test]
    fn test_ignores_truncated_frames() {
        assert!(proxy_reply(&[0u8; 10], OWN_MAC, |_| true).is_none());
    }
}
