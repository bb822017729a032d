//! Shared test utilities for usbh-uvc tests
//!
//! A simulated UVC camera behind the `UsbTransport` trait, plus builders for
//! its descriptors and payload packets.

#![allow(dead_code)]

pub mod mock_camera;

pub use mock_camera::{
    create_test_device_descriptor, payload_packet, ConfigBuilder, FrameSpec, MockCamera, FID, EOF, ERR,
};

use usbh_uvc::{CaptureSession, DeviceInfo, FrameSink, ScratchBuffers, StreamConfig, UsbTransport};

/// Fresh scratch storage; leaked so it lives as long as any receive
pub fn scratch<const N: usize>() -> &'static mut ScratchBuffers<N> {
    Box::leak(Box::new([[0; N]; 2]))
}

/// Session with the default scratch size
pub fn open_session<'a, B: AsMut<[u8]>>(
    camera: MockCamera,
    config: StreamConfig,
    frames: FrameSink<'a, B>,
) -> CaptureSession<'a, MockCamera, B> {
    match CaptureSession::init(camera, config, scratch(), frames) {
        Ok(session) => session,
        Err(e) => panic!("init failed: {}", e),
    }
}

/// Feed every packet the camera has queued through the session
///
/// Returns the number of completions delivered.
pub fn pump<B: AsMut<[u8]>, const N: usize>(session: &mut CaptureSession<'_, MockCamera, B, N>) -> usize {
    let mut delivered = 0;
    while let Some(completion) = session.transport_mut().deliver() {
        session.on_isochronous_complete(completion);
        delivered += 1;
    }
    delivered
}

/// Run setup and assert it succeeded
pub fn setup<T: UsbTransport, B: AsMut<[u8]>, const N: usize>(
    session: &mut CaptureSession<'_, T, B, N>,
) -> DeviceInfo {
    match session.setup_device() {
        Ok(info) => info,
        Err(e) => panic!("setup failed: {}", e),
    }
}
