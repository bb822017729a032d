//! Probe/commit negotiation
//!
//! Selects alternate setting 0, proposes the chosen format with SET_CUR on
//! the probe control, reads the device's answer back with GET_CUR, commits
//! it, and finally selects the streaming alternate setting. Each step is one
//! control transfer; a pending transfer parks the machine where it is.

use core::task::Poll;

use super::format::FormatSelection;
use super::probe::ProbeCommit;
use crate::descriptor::UvcVersion;
use crate::error::{Result, UvcError};
use crate::transfer::{vs_control, ControlChannel, SetupPacket};
use crate::transport::UsbTransport;

/// Negotiation progress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum NegotiationState {
    /// SET_INTERFACE to alternate 0 (no bandwidth)
    SetStreamingInterface,
    /// SET_CUR on VS_PROBE_CONTROL
    SetCurProbe,
    /// GET_CUR on VS_PROBE_CONTROL
    GetCurProbe,
    /// SET_CUR on VS_COMMIT_CONTROL
    SetCurCommit,
    /// SET_INTERFACE to the streaming alternate
    SetStreamingAlternate,
    /// Device is streaming
    Done,
}

/// Probe/commit state machine for one streaming interface
#[derive(Debug)]
pub struct Negotiation {
    state: NegotiationState,
    selection: FormatSelection,
    requested: ProbeCommit,
    working: ProbeCommit,
    in_buf: [u8; ProbeCommit::LEN_V1_1],
}

impl Negotiation {
    /// Start negotiating `selection` with the probe layout of `version`
    pub fn new(selection: FormatSelection, version: UvcVersion) -> Self {
        let requested = ProbeCommit::request(
            version,
            selection.format_index,
            selection.frame_index,
            selection.frame_interval,
        );
        Self {
            state: NegotiationState::SetStreamingInterface,
            selection,
            requested,
            working: requested,
            in_buf: [0; ProbeCommit::LEN_V1_1],
        }
    }

    /// Current state
    pub fn state(&self) -> NegotiationState {
        self.state
    }

    /// Selection being negotiated
    pub fn selection(&self) -> &FormatSelection {
        &self.selection
    }

    /// Working probe/commit value (the device's answer once probed)
    pub fn probe(&self) -> &ProbeCommit {
        &self.working
    }

    fn advance(&mut self, next: NegotiationState) {
        debug!("negotiation: {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    /// Drive one control transfer
    ///
    /// Returns `Ready(Ok(()))` once the streaming alternate is selected.
    pub fn poll<T: UsbTransport>(&mut self, transport: &mut T, channel: &mut ControlChannel) -> Poll<Result<()>> {
        let interface = self.selection.interface;
        let len = self.working.wire_len();
        let mut out = [0u8; ProbeCommit::LEN_V1_1];

        let (setup, out_data_len, next) = match self.state {
            NegotiationState::Done => return Poll::Ready(Ok(())),
            NegotiationState::SetStreamingInterface => (
                SetupPacket::set_interface(interface, 0),
                0,
                NegotiationState::SetCurProbe,
            ),
            NegotiationState::SetCurProbe => {
                let written = self.requested.encode(&mut out).ok_or(UvcError::InvalidState)?;
                (
                    SetupPacket::uvc_set_cur(vs_control::PROBE, interface, written as u16),
                    written,
                    NegotiationState::GetCurProbe,
                )
            }
            NegotiationState::GetCurProbe => (
                SetupPacket::uvc_get_cur(vs_control::PROBE, interface, len as u16),
                0,
                NegotiationState::SetCurCommit,
            ),
            NegotiationState::SetCurCommit => {
                let written = self.working.encode(&mut out).ok_or(UvcError::InvalidState)?;
                (
                    SetupPacket::uvc_set_cur(vs_control::COMMIT, interface, written as u16),
                    written,
                    NegotiationState::SetStreamingAlternate,
                )
            }
            NegotiationState::SetStreamingAlternate => (
                SetupPacket::set_interface(interface, self.selection.alternate),
                0,
                NegotiationState::Done,
            ),
        };

        let in_len = if setup.is_in() { len } else { 0 };
        let received = match channel.request(transport, &setup, &out[..out_data_len], &mut self.in_buf[..in_len]) {
            Poll::Pending => return Poll::Pending,
            Poll::Ready(Ok(received)) => received,
            Poll::Ready(Err(e)) => {
                warn!("negotiation failed in {:?}: {}", self.state, e);
                return Poll::Ready(Err(UvcError::Transport(e)));
            }
        };

        if self.state == NegotiationState::GetCurProbe {
            self.check_probe_answer(received)?;
        }
        self.advance(next);
        if next == NegotiationState::Done {
            Poll::Ready(Ok(()))
        } else {
            Poll::Pending
        }
    }

    fn check_probe_answer(&mut self, received: usize) -> Result<()> {
        let version = self.requested.version();
        let answer = ProbeCommit::decode(version, &self.in_buf[..received]).ok_or_else(|| {
            warn!("probe answer too short: {} bytes", received);
            UvcError::DeviceNotCompliant
        })?;
        if !self.requested.agrees_with(&answer) {
            warn!(
                "device changed probe: format {}->{} frame {}->{} interval {}->{}",
                self.requested.format_index,
                answer.format_index,
                self.requested.frame_index,
                answer.frame_index,
                self.requested.frame_interval,
                answer.frame_interval
            );
            return Err(UvcError::DeviceNotCompliant);
        }
        info!(
            "probe accepted: max frame {} bytes, max payload {} bytes",
            answer.max_video_frame_size,
            answer.max_payload_transfer_size
        );
        self.working = answer;
        Ok(())
    }
}
