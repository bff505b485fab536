// Admission gates and the render handshake.
//
// Each agent slot owns one gate starting at zero. The orchestrator posts it to
// let that agent act once; the agent waits on it before every action and
// never posts it itself. The render handshake is a plain ping-pong:
// request -> draw under the reader role -> done.

use crate::shm_layout::SyncBlock;
use std::io;
use std::time::Duration;

impl SyncBlock {
    /// Allow the agent in `slot` exactly one more action.
    pub fn admit(&self, slot: usize) -> io::Result<()> {
        self.gate(slot)?.post()
    }

    /// Agent side: block until admitted.
    pub fn await_admission(&self, slot: usize) -> io::Result<()> {
        self.gate(slot)?.wait()
    }

    /// Agent side, bounded: `false` if no admission arrived within `timeout`.
    pub fn await_admission_timeout(&self, slot: usize, timeout: Duration) -> io::Result<bool> {
        self.gate(slot)?.wait_timeout(timeout)
    }

    /// Orchestrator side: ask the renderer for a frame.
    pub fn request_render(&self) -> io::Result<()> {
        self.render_request.post()
    }

    /// Orchestrator side: wait for the frame, `false` on timeout.
    pub fn await_render_done(&self, timeout: Duration) -> io::Result<bool> {
        self.render_done.wait_timeout(timeout)
    }

    /// Renderer side: block until a frame is requested.
    pub fn await_render_request(&self) -> io::Result<()> {
        self.render_request.wait()
    }

    /// Renderer side: report the frame as drawn.
    pub fn render_done(&self) -> io::Result<()> {
        self.render_done.post()
    }
}
