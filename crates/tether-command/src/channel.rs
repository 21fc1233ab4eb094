//! The two endpoints of the command channel.
//!
//! Each direction is an unbounded [`crossbeam_channel`] queue of encoded
//! frames. Frames are encoded by the sender and decoded by the receiver, so a
//! frame is delivered atomically and in FIFO order per direction.

use crossbeam_channel::{Receiver, Sender, TryRecvError, unbounded};

use crate::command::{CommandError, MainCommand, NetworkCommand};

/// Something that runs the network side of the channel.
pub trait NetworkThread: Send {
    /// Spawn the accept loop. Must return without waiting for clients.
    fn start(&mut self) -> std::io::Result<()>;
}

/// Create a connected pair of endpoints.
pub fn command_channel() -> (MainEndpoint, NetworkEndpoint) {
    let (to_network, from_main) = unbounded();
    let (to_main, from_network) = unbounded();
    (
        MainEndpoint {
            tx: to_network,
            rx: from_network,
        },
        NetworkEndpoint {
            tx: to_main,
            rx: from_main,
        },
    )
}

/// Main-thread side: sends [`MainCommand`]s, receives [`NetworkCommand`]s.
#[derive(Clone)]
pub struct MainEndpoint {
    tx: Sender<Vec<u8>>,
    rx: Receiver<Vec<u8>>,
}

impl MainEndpoint {
    /// Queue a command for the network thread. Never blocks.
    pub fn send(&self, command: &MainCommand) -> Result<(), CommandError> {
        self.send_raw(command.encode())
    }

    /// Queue an already encoded frame.
    pub fn send_raw(&self, frame: Vec<u8>) -> Result<(), CommandError> {
        self.tx.send(frame).map_err(|_| CommandError::Disconnected)
    }

    /// Take the next frame from the network thread, if one is queued.
    ///
    /// A disconnected network side with an empty queue reads as empty.
    pub fn try_recv_raw(&self) -> Option<Vec<u8>> {
        match self.rx.try_recv() {
            Ok(frame) => Some(frame),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    /// Take and decode the next command. The frame is consumed even when it
    /// fails to decode.
    pub fn try_recv(&self) -> Result<Option<NetworkCommand>, CommandError> {
        self.try_recv_raw()
            .map(|frame| NetworkCommand::decode(&frame))
            .transpose()
    }

    /// Number of frames waiting to be read by the main thread.
    pub fn pending(&self) -> usize {
        self.rx.len()
    }
}

/// Network-thread side: sends [`NetworkCommand`]s, receives [`MainCommand`]s.
#[derive(Clone)]
pub struct NetworkEndpoint {
    tx: Sender<Vec<u8>>,
    rx: Receiver<Vec<u8>>,
}

impl NetworkEndpoint {
    /// Queue a command for the main thread. Never blocks.
    pub fn send(&self, command: &NetworkCommand) -> Result<(), CommandError> {
        self.send_raw(command.encode())
    }

    /// Queue an already encoded frame.
    pub fn send_raw(&self, frame: Vec<u8>) -> Result<(), CommandError> {
        self.tx.send(frame).map_err(|_| CommandError::Disconnected)
    }

    /// Take and decode the next command without blocking.
    pub fn try_recv(&self) -> Result<Option<MainCommand>, CommandError> {
        match self.rx.try_recv() {
            Ok(frame) => MainCommand::decode(&frame).map(Some),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(CommandError::Disconnected),
        }
    }

    /// Block until the main thread sends a command.
    ///
    /// Returns [`CommandError::Disconnected`] once the main endpoint is
    /// dropped and the queue is drained.
    pub fn recv(&self) -> Result<MainCommand, CommandError> {
        let frame = self.rx.recv().map_err(|_| CommandError::Disconnected)?;
        MainCommand::decode(&frame)
    }

    /// Number of frames waiting to be read by the network thread.
    pub fn pending(&self) -> usize {
        self.rx.len()
    }
}
