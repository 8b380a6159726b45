//! Notification buffer decoding.
//!
//! The peer sends each axis as one offset-binary byte (`value + 128`), in the
//! order `ax, ay, az, gx, gy, gz`. Anything after the sixth byte is ignored.

use super::sample::Axes;

pub const FRAME_LEN: usize = 6;

const OFFSET: i16 = 128;

/// Returns `None` for buffers shorter than one frame.
pub fn decode(buffer: &[u8]) -> Option<Axes> {
    let frame: [u8; FRAME_LEN] = buffer.get(..FRAME_LEN)?.try_into().ok()?;
    let [ax, ay, az, gx, gy, gz] = frame.map(unbias);
    Some(Axes {
        ax,
        ay,
        az,
        gx,
        gy,
        gz,
    })
}

/// Inverse of [`decode`]; used by the synthetic link to produce wire frames.
pub fn encode(axes: &Axes) -> [u8; FRAME_LEN] {
    [axes.ax, axes.ay, axes.az, axes.gx, axes.gy, axes.gz].map(bias)
}

fn unbias(byte: u8) -> i8 {
    // 0..=255 minus 128 always fits in i8.
    (i16::from(byte) - OFFSET) as i8
}

fn bias(value: i8) -> u8 {
    (i16::from(value) + OFFSET) as u8
}
