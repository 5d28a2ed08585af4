//! OSC Ingest (§4.E) — UDP listener decoding sound-control messages into
//! Voice State mutations.

use std::sync::Arc;

use tokio::net::UdpSocket;

use crate::hub::Hub;
use crate::voice::OscArg;

const RECV_BUF_SIZE: usize = 4096;

pub async fn run(socket: UdpSocket, hub: Arc<Hub>) {
    let mut buf = [0u8; RECV_BUF_SIZE];
    loop {
        match socket.recv_from(&mut buf).await {
            Ok((len, _src)) => dispatch_packet(&buf[..len], &hub),
            Err(err) => {
                // The listener itself stays alive on socket errors (§4.E).
                tracing::warn!(%err, "osc socket recv error");
            }
        }
    }
}

fn dispatch_packet(bytes: &[u8], hub: &Arc<Hub>) {
    match rosc::decoder::decode_udp(bytes) {
        Ok((_, packet)) => {
            hub.note_osc_datagram();
            flatten(packet, hub);
        }
        Err(err) => {
            tracing::debug!(?err, "osc decode error, dropping datagram");
            hub.note_osc_decode_error();
        }
    }
}

fn flatten(packet: rosc::OscPacket, hub: &Arc<Hub>) {
    match packet {
        rosc::OscPacket::Message(msg) => {
            let args = convert_args(msg.args);
            hub.handle_osc_message(&msg.addr, &args);
        }
        rosc::OscPacket::Bundle(bundle) => {
            for inner in bundle.content {
                flatten(inner, hub);
            }
        }
    }
}

fn convert_args(args: Vec<rosc::OscType>) -> Vec<OscArg> {
    args.into_iter()
        .filter_map(|arg| match arg {
            rosc::OscType::Int(i) => Some(OscArg::Int(i as i64)),
            rosc::OscType::Long(l) => Some(OscArg::Int(l)),
            rosc::OscType::Float(f) => Some(OscArg::Float(f as f64)),
            rosc::OscType::Double(d) => Some(OscArg::Float(d)),
            rosc::OscType::String(s) => Some(OscArg::String(s)),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_recognized_arg_types() {
        let args = convert_args(vec![
            rosc::OscType::Int(1),
            rosc::OscType::Float(2.5),
            rosc::OscType::String("tia".to_string()),
        ]);
        assert_eq!(args.len(), 3);
        assert!(matches!(args[0], OscArg::Int(1)));
        assert!(matches!(args[2], OscArg::String(ref s) if s == "tia"));
    }
}
