//! The socket layer: SCBs, the port map, and the listen/connect/accept
//! rendezvous.

mod socket;

pub use socket::{
    accept, clear_port_map, connect, initialize_port_map, listen, shutdown, socket_new,
    ConnectionRequest, Scb, ScbInner, ShutdownMode, SocketFile, SocketKind,
};
