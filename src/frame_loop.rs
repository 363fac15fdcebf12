use winit::window::Window;

/// The host's "call me again on the next frame" primitive.
pub trait FrameScheduler {
    fn request_frame(&self);
}

impl FrameScheduler for Window {
    fn request_frame(&self) {
        self.request_redraw();
    }
}

/// Per-frame callback that re-arms itself through a [`FrameScheduler`]
/// after every frame it runs, until stopped.
#[derive(Debug, Default)]
pub struct FrameLoop {
    running: bool,
    frames: u64,
}

impl FrameLoop {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start<S: FrameScheduler + ?Sized>(&mut self, scheduler: &S) {
        if !self.running {
            self.running = true;
            scheduler.request_frame();
        }
    }

    /// Stops re-arming; a frame already requested from the host runs as a no-op.
    pub fn stop(&mut self) {
        self.running = false;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Runs `body` for the frame the host just delivered and asks for the next one.
    pub fn run_frame<S, R>(&mut self, scheduler: &S, body: impl FnOnce() -> R) -> Option<R>
    where
        S: FrameScheduler + ?Sized,
    {
        if !self.running {
            return None;
        }
        let result = body();
        self.frames += 1;
        scheduler.request_frame();
        Some(result)
    }
}
