//! The null method: no confidentiality, no integrity.
//!
//! Exists for debugging and throughput measurement. Packets pass through
//! unchanged, so there is no nonce on the wire and no replay protection;
//! the common state still drives session expiry and refresh so the
//! lifecycle behaves like any other method.

use std::time::Instant;

use super::common::CommonState;
use super::{Method, MethodEnv, MethodError, MethodInfo, MethodSession};
use crate::buffer::Buffer;
use crate::packet::PACKET_OVERHEAD;

static INFO: MethodInfo = MethodInfo { name: "null" };

/// Build the portable null method.
pub(crate) fn build() -> Box<dyn Method> {
    Box::new(NullMethod)
}

struct NullMethod;

impl Method for NullMethod {
    fn info(&self) -> &MethodInfo {
        &INFO
    }

    fn min_encrypt_head_space(&self) -> usize {
        PACKET_OVERHEAD
    }

    fn session_init(
        &self,
        env: &mut MethodEnv<'_>,
        _secret: &[u8; 32],
        initiator: bool,
    ) -> Box<dyn MethodSession> {
        Box::new(NullSession {
            common: CommonState::new(env, initiator),
        })
    }
}

struct NullSession {
    common: CommonState,
}

impl MethodSession for NullSession {
    fn is_valid(&self, now: Instant) -> bool {
        self.common.is_valid(now)
    }

    fn is_initiator(&self) -> bool {
        self.common.is_initiator()
    }

    fn want_refresh(&self, now: Instant) -> bool {
        self.common.want_refresh(now)
    }

    fn encrypt(&mut self, buffer: Buffer) -> Result<Buffer, MethodError> {
        Ok(buffer)
    }

    fn decrypt(&mut self, _now: Instant, packet: &[u8]) -> Result<Buffer, MethodError> {
        Ok(Buffer::from_slice(packet, 0))
    }
}
