//! # the software stand-in device
//! - implements the nearest centroid oracle of the hardware kernel in
//!   software, against the same packed buffer contract, so the host side
//!   can run and be tested without an attached accelerator.
//! - ties on the squared distance go to the lower cluster index. the real
//!   hardware leaves tie breaking unspecified, fixtures must not rely on it.

use log::debug;

use super::session::{BufferHandle, Device};
use crate::layout::LINE_SIZE;

struct KernelArgs {
    input_size: usize,
    output_size: usize,
    input: BufferHandle,
    output: BufferHandle,
}

/// a fixed function kernel is synthesized for one point width, so the
/// stand-in is constructed for a fixed `num_dims` as well. the cluster
/// count is read from the header scalar of the packed buffer.
pub struct SoftwareDevice {
    num_dims: usize,
    programmed: bool,
    buffers: Vec<Vec<u8>>,
    args: Option<KernelArgs>,
}

impl SoftwareDevice {
    pub fn new(num_dims: usize) -> Self {
        SoftwareDevice {
            num_dims,
            programmed: false,
            buffers: Vec::new(),
            args: None,
        }
    }

    fn buffer(&self, handle: BufferHandle) -> Result<&Vec<u8>, String> {
        self.buffers
            .get(handle.0)
            .ok_or_else(|| format!("unknown buffer handle {}", handle.0))
    }
}

/// the candidate devices visible to [`super::Session::open`]. the software
/// backend always exposes exactly one.
pub fn enumerate(num_dims: usize) -> Vec<Box<dyn Device>> {
    vec![Box::new(SoftwareDevice::new(num_dims))]
}

impl Device for SoftwareDevice {
    fn name(&self) -> String {
        format!("software nearest-centroid kernel, {} dims", self.num_dims)
    }

    fn program(&mut self, image: &[u8]) -> Result<(), String> {
        if image.is_empty() {
            return Err("refusing to program an empty binary image".into());
        }
        self.programmed = true;
        Ok(())
    }

    fn create_buffer(&mut self, size: usize) -> Result<BufferHandle, String> {
        if !self.programmed {
            return Err("device is not programmed".into());
        }
        self.buffers.push(vec![0u8; size]);
        Ok(BufferHandle(self.buffers.len() - 1))
    }

    fn set_args(
        &mut self,
        input_size: usize,
        output_size: usize,
        input: BufferHandle,
        output: BufferHandle,
    ) -> Result<(), String> {
        if self.buffer(input)?.len() != input_size {
            return Err("input size argument does not match the input buffer".into());
        }
        if self.buffer(output)?.len() != output_size {
            return Err("output size argument does not match the output buffer".into());
        }
        self.args = Some(KernelArgs {
            input_size,
            output_size,
            input,
            output,
        });
        Ok(())
    }

    fn write_buffer(
        &mut self,
        handle: BufferHandle,
        offset: usize,
        bytes: &[u8],
    ) -> Result<(), String> {
        let buffer = self
            .buffers
            .get_mut(handle.0)
            .ok_or_else(|| format!("unknown buffer handle {}", handle.0))?;
        if offset + bytes.len() > buffer.len() {
            return Err(format!(
                "write of {} bytes at offset {} exceeds the {} byte buffer",
                bytes.len(),
                offset,
                buffer.len()
            ));
        }
        buffer[offset..offset + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    fn run_kernel(&mut self) -> Result<(), String> {
        let args = self.args.as_ref().ok_or("kernel arguments are not set")?;
        let num_dims = self.num_dims;
        let input = self.buffer(args.input)?;
        if args.input_size < LINE_SIZE + 8 {
            return Err("input buffer too small for header and one centroid".into());
        }

        // header line: the K*D scalar
        let kd = u32::from_le_bytes(input[0..4].try_into().unwrap()) as usize;
        if kd == 0 || kd % num_dims != 0 {
            return Err(format!(
                "header scalar {} does not match the {} dim kernel",
                kd, num_dims
            ));
        }
        let num_clusters = kd / num_dims;

        // centroid table: (tag, value) pairs, the tag is addressing only
        let centroid_offset = LINE_SIZE;
        let centroid_bytes = (kd * 8 + LINE_SIZE - 1) / LINE_SIZE * LINE_SIZE;
        let point_offset = centroid_offset + centroid_bytes;
        if point_offset > args.input_size {
            return Err(format!(
                "header scalar {} implies a {} byte centroid region, the {} byte input buffer cannot hold it",
                kd, centroid_bytes, args.input_size
            ));
        }
        let centroids: Vec<i64> = (0..kd)
            .map(|idx| {
                let at = centroid_offset + idx * 8 + 4;
                i32::from_le_bytes(input[at..at + 4].try_into().unwrap()) as i64
            })
            .collect();

        // point table: every slot of the padded region gets a label
        let point_bytes = args.input_size - point_offset;
        let num_slots = point_bytes / (2 * num_dims);
        debug!(
            "kernel run: {} clusters, {} dims, {} point slots",
            num_clusters, num_dims, num_slots
        );

        let mut labels = vec![0u8; args.output_size];
        for slot in 0..num_slots.min(args.output_size) {
            let mut best = i64::MAX;
            let mut best_cluster = 0usize;
            for cluster in 0..num_clusters {
                let mut dist = 0i64;
                for dim in 0..num_dims {
                    let at = point_offset + 2 * (slot * num_dims + dim);
                    let coord = i16::from_le_bytes(input[at..at + 2].try_into().unwrap()) as i64;
                    let diff = coord - centroids[cluster * num_dims + dim];
                    dist += diff * diff;
                }
                // strict less keeps the lower index on a tie
                if dist < best {
                    best = dist;
                    best_cluster = cluster;
                }
            }
            labels[slot] = best_cluster as u8;
        }

        let output = self
            .buffers
            .get_mut(args.output.0)
            .ok_or_else(|| format!("unknown buffer handle {}", args.output.0))?;
        output.copy_from_slice(&labels);
        Ok(())
    }

    fn read_buffer(&mut self, handle: BufferHandle, out: &mut [u8]) -> Result<(), String> {
        let buffer = self.buffer(handle)?;
        if out.len() != buffer.len() {
            return Err(format!(
                "host mirror is {} bytes, device buffer is {}",
                out.len(),
                buffer.len()
            ));
        }
        out.copy_from_slice(buffer);
        Ok(())
    }

    fn release(&mut self) {
        self.buffers.clear();
        self.args = None;
        self.programmed = false;
    }
}
