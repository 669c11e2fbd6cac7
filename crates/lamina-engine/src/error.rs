//! Recoverable rendering failures.
//!
//! Only conditions a caller can reasonably degrade around live here. State
//! machine violations (drawing before init, unbalanced clip stacks, buffer
//! overflow without `expand`, stale layer ids) panic instead.

use core::fmt;

/// Optional backend features a layer factory may require.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Capability {
    /// Application callbacks invoked during traversal.
    ImmediateRendering,
    /// Render-to-texture targets.
    Framebuffers,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::ImmediateRendering => f.write_str("immediate rendering"),
            Capability::Framebuffers => f.write_str("framebuffers"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RenderError {
    /// The backend could not allocate a GPU resource.
    #[error("GPU resource exhausted while creating {what}")]
    ResourceExhausted { what: &'static str },

    /// The backend lacks a capability the request needs.
    #[error("backend does not support {0}")]
    Unsupported(Capability),

    /// Pixel data does not match the declared dimensions.
    #[error("pixel data is {actual} bytes, expected {expected} for {width}x{height}")]
    InvalidPixels {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },
}

impl RenderError {
    #[inline]
    pub fn exhausted(what: &'static str) -> Self {
        RenderError::ResourceExhausted { what }
    }
}
