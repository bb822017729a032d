//! Scripted transport for unit tests

use std::collections::VecDeque;
use std::vec::Vec;

use crate::error::UsbError;
use crate::transfer::{ControlStatus, SetupPacket};
use crate::transport::{Speed, UsbTransport};

/// Answers control polls from a script, records everything it is asked to do
pub struct ScriptedTransport {
    pub speed: Speed,
    pub script: VecDeque<(ControlStatus, Vec<u8>)>,
    pub fallback: ControlStatus,
    pub setups: Vec<SetupPacket>,
    pub out_data: Vec<Vec<u8>>,
    pub control_pipes: Vec<(u8, u16)>,
    pub streaming_pipe: Option<(u8, u8, u16)>,
    pub resets: usize,
    pub iso_receives: usize,
    pub iso_cancels: usize,
    pub last_iso_len: usize,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self {
            speed: Speed::High,
            script: VecDeque::new(),
            fallback: ControlStatus::Done(0),
            setups: Vec::new(),
            out_data: Vec::new(),
            control_pipes: Vec::new(),
            streaming_pipe: None,
            resets: 0,
            iso_receives: 0,
            iso_cancels: 0,
            last_iso_len: 0,
        }
    }

    /// Every control transfer stalls
    pub fn always_stall() -> Self {
        let mut transport = Self::new();
        transport.fallback = ControlStatus::Stalled;
        transport
    }

    pub fn push_pending(&mut self) {
        self.script.push_back((ControlStatus::Pending, Vec::new()));
    }

    pub fn push_data(&mut self, data: &[u8]) {
        self.script.push_back((ControlStatus::Done(data.len()), data.to_vec()));
    }

    pub fn push_done(&mut self) {
        self.script.push_back((ControlStatus::Done(0), Vec::new()));
    }

    pub fn push_status(&mut self, status: ControlStatus) {
        self.script.push_back((status, Vec::new()));
    }
}

impl UsbTransport for ScriptedTransport {
    fn reset_port(&mut self) -> Result<(), UsbError> {
        self.resets += 1;
        Ok(())
    }

    fn port_speed(&self) -> Speed {
        self.speed
    }

    fn open_control_pipe(&mut self, address: u8, max_packet: u16) -> Result<(), UsbError> {
        self.control_pipes.push((address, max_packet));
        Ok(())
    }

    fn open_streaming_pipe(&mut self, address: u8, endpoint: u8, max_packet: u16) -> Result<(), UsbError> {
        self.streaming_pipe = Some((address, endpoint, max_packet));
        Ok(())
    }

    fn submit_control(&mut self, setup: &SetupPacket, out_data: &[u8]) -> Result<(), UsbError> {
        self.setups.push(*setup);
        self.out_data.push(out_data.to_vec());
        Ok(())
    }

    fn poll_control(&mut self, in_data: &mut [u8]) -> ControlStatus {
        match self.script.pop_front() {
            Some((ControlStatus::Done(_), data)) if !data.is_empty() => {
                let len = data.len().min(in_data.len());
                in_data[..len].copy_from_slice(&data[..len]);
                ControlStatus::Done(len)
            }
            Some((status, _)) => status,
            None => self.fallback,
        }
    }

    unsafe fn receive_isochronous(&mut self, _buffer: *mut u8, len: usize) -> Result<(), UsbError> {
        self.iso_receives += 1;
        self.last_iso_len = len;
        Ok(())
    }

    fn cancel_isochronous(&mut self) {
        self.iso_cancels += 1;
    }
}
