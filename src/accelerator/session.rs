//! # the accelerator session
//! - a session is the live binding between the host and one programmed
//!   device, valid from [`Session::open`] to [`Session::close`].
//! - every operation blocks the calling thread, there is never more than
//!   one invocation in flight.

use log::{info, warn};

use crate::error::KmeansError;

/// opaque handle to one device resident buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferHandle(pub(crate) usize);

/// the capability set a backend has to provide: programming, buffer
/// residency and kernel invocation.
///
/// the nearest centroid computation itself is fixed function hardware and
/// opaque to the host, so it lives behind this trait. the crate ships the
/// software stand-in in [`super::software`], a real device backend
/// implements the same contract.
pub trait Device {
    fn name(&self) -> String;
    /// try to program the device with the binary image. a rejection is not
    /// fatal, the session moves on to the next candidate.
    fn program(&mut self, image: &[u8]) -> Result<(), String>;
    fn create_buffer(&mut self, size: usize) -> Result<BufferHandle, String>;
    /// bind the four kernel arguments, fixed for the session lifetime.
    fn set_args(
        &mut self,
        input_size: usize,
        output_size: usize,
        input: BufferHandle,
        output: BufferHandle,
    ) -> Result<(), String>;
    fn write_buffer(&mut self, handle: BufferHandle, offset: usize, bytes: &[u8])
        -> Result<(), String>;
    /// submit the bound kernel and block until it finishes.
    fn run_kernel(&mut self) -> Result<(), String>;
    fn read_buffer(&mut self, handle: BufferHandle, out: &mut [u8]) -> Result<(), String>;
    fn release(&mut self);
}

fn io_error(stage: &'static str, detail: String) -> KmeansError {
    KmeansError::AcceleratorIo { stage, detail }
}

/// # Description
/// - owns the programmed device and the lifecycle checks around it.
/// - `open` commits to the first candidate that accepts the image,
///   `allocate` and `bind_arguments` are called once, `upload`,
///   `invoke_and_wait` and `download` repeat every iteration.
pub struct Session {
    device: Box<dyn Device>,
    args_bound: bool,
    closed: bool,
}

impl Session {
    /// enumerate the candidate devices and program the first one that
    /// accepts the image.
    /// # Return
    /// - `Err(NoUsableDevice)` if every candidate rejects the image.
    pub fn open(candidates: Vec<Box<dyn Device>>, image: &[u8]) -> Result<Self, KmeansError> {
        let tried = candidates.len();
        for (index, mut device) in candidates.into_iter().enumerate() {
            info!("trying to program device[{}]: {}", index, device.name());
            match device.program(image) {
                Ok(()) => {
                    info!("device[{}]: program successful", index);
                    return Ok(Session {
                        device,
                        args_bound: false,
                        closed: false,
                    });
                }
                Err(e) => {
                    warn!("failed to program device[{}] with binary image: {}", index, e);
                }
            }
        }
        Err(KmeansError::NoUsableDevice { tried })
    }

    fn check_open(&self, op: &str) -> Result<(), KmeansError> {
        if self.closed {
            return Err(KmeansError::invalid_state(format!(
                "`{}` called on a closed session",
                op
            )));
        }
        Ok(())
    }

    /// reserve device visible memory for the packed input buffer and the
    /// label table.
    pub fn allocate(
        &mut self,
        input_size: usize,
        output_size: usize,
    ) -> Result<(BufferHandle, BufferHandle), KmeansError> {
        self.check_open("allocate")?;
        let input = self
            .device
            .create_buffer(input_size)
            .map_err(|e| io_error("allocate", e))?;
        let output = self
            .device
            .create_buffer(output_size)
            .map_err(|e| io_error("allocate", e))?;
        Ok((input, output))
    }

    /// bind the kernel invocation arguments. must be called exactly once
    /// before the first `invoke_and_wait`, only the buffer contents change
    /// afterwards.
    pub fn bind_arguments(
        &mut self,
        input_size: usize,
        output_size: usize,
        input: BufferHandle,
        output: BufferHandle,
    ) -> Result<(), KmeansError> {
        self.check_open("bind_arguments")?;
        if self.args_bound {
            return Err(KmeansError::invalid_state(
                "kernel arguments are already bound for this session",
            ));
        }
        self.device
            .set_args(input_size, output_size, input, output)
            .map_err(|e| io_error("bind_arguments", e))?;
        self.args_bound = true;
        Ok(())
    }

    /// copy `buffer[range]` into device memory at the same offset. bytes
    /// outside the range keep whatever a prior upload left on the device.
    pub fn upload(
        &mut self,
        handle: BufferHandle,
        buffer: &[u8],
        range: std::ops::Range<usize>,
    ) -> Result<(), KmeansError> {
        self.check_open("upload")?;
        self.device
            .write_buffer(handle, range.start, &buffer[range])
            .map_err(|e| io_error("upload", e))
    }

    /// submit the bound kernel and block until completion. one opaque unit
    /// of work, no progress reporting, no cancellation.
    pub fn invoke_and_wait(&mut self) -> Result<(), KmeansError> {
        self.check_open("invoke_and_wait")?;
        if !self.args_bound {
            return Err(KmeansError::invalid_state(
                "`invoke_and_wait` called before `bind_arguments`",
            ));
        }
        self.device
            .run_kernel()
            .map_err(|e| io_error("invoke_and_wait", e))
    }

    /// copy the full output region back to host memory, blocking.
    pub fn download(&mut self, handle: BufferHandle, out: &mut [u8]) -> Result<(), KmeansError> {
        self.check_open("download")?;
        self.device
            .read_buffer(handle, out)
            .map_err(|e| io_error("download", e))
    }

    /// release the device resources. the session must not be used after.
    pub fn close(&mut self) {
        if !self.closed {
            self.device.release();
            self.closed = true;
        }
    }
}
