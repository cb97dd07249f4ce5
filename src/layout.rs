//! # the packed buffer codec
//! - this mod computes the region layout of the packed accelerator buffer
//!   and serializes/deserializes the regions.
//! - it has no device or file io knowledge.
//!
//! the packed buffer holds three regions in order, each one padded to the
//! accelerator line size of 64 bytes:
//! - the configuration header, a single line carrying the `K*D` scalar
//! - the centroid table, one `(tag, value)` pair of 4 bytes each per
//!   centroid dimension
//! - the point table, one little endian i16 per coordinate
//!
//! the fixed line alignment lets the accelerator address each region by line
//! number, and lets the host resend only the header and centroid lines while
//! the point lines stay resident on the device.

use crate::error::KmeansError;

/// the minimum addressable transfer unit of the accelerator, 512 bits.
pub const LINE_SIZE: usize = 64;
/// bytes of one centroid dimension entry, a 4 byte line tag plus a 4 byte value.
const CENTROID_ENTRY_BYTES: usize = 8;
/// bytes of one point coordinate.
const COORD_BYTES: usize = 2;

fn round_up_to_line(bytes: usize) -> usize {
    (bytes + LINE_SIZE - 1) / LINE_SIZE * LINE_SIZE
}

/// # Description
/// - the region sizes and offsets of the packed buffer for one
///   `(num_points, num_clusters, num_dims)` shape.
/// - sizes are always multiples of [`LINE_SIZE`], offsets are cumulative
///   sums of the preceding sizes and never stored redundantly elsewhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferLayout {
    pub num_points: usize,
    pub num_clusters: usize,
    pub num_dims: usize,

    pub header_bytes: usize,
    pub centroid_bytes: usize,
    pub point_bytes: usize,
    pub output_bytes: usize,

    pub header_offset: usize,
    pub centroid_offset: usize,
    pub point_offset: usize,
}

impl BufferLayout {
    /// compute the layout for the given shape.
    /// # Return
    /// - `Err(InvalidShape)` if any count is zero, before anything is allocated.
    pub fn new(
        num_points: usize,
        num_clusters: usize,
        num_dims: usize,
    ) -> Result<Self, KmeansError> {
        if num_points == 0 || num_clusters == 0 || num_dims == 0 {
            return Err(KmeansError::InvalidShape {
                num_points,
                num_clusters,
                num_dims,
            });
        }
        let header_bytes = LINE_SIZE;
        let centroid_bytes = round_up_to_line(num_clusters * num_dims * CENTROID_ENTRY_BYTES);
        let point_bytes = round_up_to_line(num_points * num_dims * COORD_BYTES);
        // one label byte per point slot of the padded point region
        let output_bytes = round_up_to_line(point_bytes / (COORD_BYTES * num_dims));

        Ok(BufferLayout {
            num_points,
            num_clusters,
            num_dims,
            header_bytes,
            centroid_bytes,
            point_bytes,
            output_bytes,
            header_offset: 0,
            centroid_offset: header_bytes,
            point_offset: header_bytes + centroid_bytes,
        })
    }

    /// the total size of the packed input buffer.
    pub fn input_bytes(&self) -> usize {
        self.header_bytes + self.centroid_bytes + self.point_bytes
    }

    /// the byte range resent every iteration, header plus centroid table.
    pub fn mutable_range(&self) -> std::ops::Range<usize> {
        0..self.header_bytes + self.centroid_bytes
    }

    /// write the `K*D` scalar into the header line, the rest of the line is
    /// zeroed.
    pub fn encode_header(&self, buffer: &mut [u8]) {
        assert!(buffer.len() >= self.input_bytes(), "packed buffer too small");
        let scalar = (self.num_clusters * self.num_dims) as u32;
        buffer[self.header_offset..self.header_offset + self.header_bytes].fill(0);
        buffer[self.header_offset..self.header_offset + 4].copy_from_slice(&scalar.to_le_bytes());
    }

    /// write the centroid table.
    ///
    /// each centroid dimension becomes a `(tag, value)` pair in cluster major,
    /// dimension minor order. the tag is a 1 based counter required by the
    /// accelerator addressing scheme, it carries no semantic value and is
    /// regenerated identically on every call.
    /// # Arguments
    /// * `centroids` - the flat `K*D` mean values, cluster major
    pub fn encode_centroids(&self, buffer: &mut [u8], centroids: &[i32]) {
        assert!(buffer.len() >= self.input_bytes(), "packed buffer too small");
        assert_eq!(
            centroids.len(),
            self.num_clusters * self.num_dims,
            "centroid table has the wrong shape"
        );
        for (idx, &value) in centroids.iter().enumerate() {
            let tag = (idx + 1) as u32;
            let at = self.centroid_offset + idx * CENTROID_ENTRY_BYTES;
            buffer[at..at + 4].copy_from_slice(&tag.to_le_bytes());
            buffer[at + 4..at + 8].copy_from_slice(&value.to_le_bytes());
        }
    }

    /// write the point table, point major, dimension minor, little endian i16.
    /// fewer coordinates than `num_points * num_dims` leave the tail zero.
    pub fn encode_points(&self, buffer: &mut [u8], coords: &[i16]) {
        assert!(buffer.len() >= self.input_bytes(), "packed buffer too small");
        assert!(
            coords.len() <= self.num_points * self.num_dims,
            "more coordinates than the allocated point region holds"
        );
        for (idx, &coord) in coords.iter().enumerate() {
            let at = self.point_offset + idx * COORD_BYTES;
            buffer[at..at + COORD_BYTES].copy_from_slice(&coord.to_le_bytes());
        }
    }

    /// read back the label bytes, one per point. the output region also
    /// carries labels for the padding point slots, those are dropped here.
    /// labels are accelerator defined cluster indices and trusted verbatim.
    pub fn decode_labels<'a>(&self, output_buffer: &'a [u8]) -> &'a [u8] {
        assert!(
            output_buffer.len() >= self.num_points,
            "output buffer shorter than one label per point"
        );
        &output_buffer[..self.num_points]
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_rejects_zero_counts() {
        assert!(matches!(
            BufferLayout::new(0, 2, 2),
            Err(KmeansError::InvalidShape { .. })
        ));
        assert!(matches!(
            BufferLayout::new(10, 0, 2),
            Err(KmeansError::InvalidShape { .. })
        ));
        assert!(matches!(
            BufferLayout::new(10, 2, 0),
            Err(KmeansError::InvalidShape { .. })
        ));
    }

    #[test]
    fn test_regions_line_aligned_and_increasing() {
        for (n, k, d) in [(1, 1, 1), (4, 2, 1), (10, 2, 2), (100, 7, 3), (1000, 16, 8)] {
            let layout = BufferLayout::new(n, k, d).unwrap();
            assert_eq!(layout.header_bytes % LINE_SIZE, 0);
            assert_eq!(layout.centroid_bytes % LINE_SIZE, 0);
            assert_eq!(layout.point_bytes % LINE_SIZE, 0);
            assert_eq!(layout.output_bytes % LINE_SIZE, 0);
            assert_eq!(layout.header_offset, 0);
            assert_eq!(layout.centroid_offset, layout.header_bytes);
            assert_eq!(
                layout.point_offset,
                layout.centroid_offset + layout.centroid_bytes
            );
            assert_eq!(layout.input_bytes(), layout.point_offset + layout.point_bytes);
            assert!(layout.output_bytes >= n);
        }
    }

    #[test]
    fn test_known_sizes() {
        // 10 points, 2 clusters, 2 dims, the shape of the original demo
        let layout = BufferLayout::new(10, 2, 2).unwrap();
        assert_eq!(layout.header_bytes, 64);
        // 2*2*8 = 32 -> 64
        assert_eq!(layout.centroid_bytes, 64);
        // 10*2*2 = 40 -> 64
        assert_eq!(layout.point_bytes, 64);
        // 64/(2*2) = 16 -> 64
        assert_eq!(layout.output_bytes, 64);
        assert_eq!(layout.mutable_range(), 0..128);
    }

    #[test]
    fn test_header_scalar() {
        let layout = BufferLayout::new(8, 3, 2).unwrap();
        let mut buffer = vec![0xffu8; layout.input_bytes()];
        layout.encode_header(&mut buffer);
        assert_eq!(u32::from_le_bytes(buffer[0..4].try_into().unwrap()), 6);
        // the rest of the header line is zero
        assert!(buffer[4..64].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_centroid_tags_deterministic() {
        let layout = BufferLayout::new(8, 2, 3).unwrap();
        let mut first = vec![0u8; layout.input_bytes()];
        let mut second = vec![0u8; layout.input_bytes()];
        layout.encode_centroids(&mut first, &[7, -3, 0, 12, 5, -9]);
        layout.encode_centroids(&mut second, &[1, 1, 1, 1, 1, 1]);
        for idx in 0..6 {
            let at = layout.centroid_offset + idx * 8;
            let tag_a = u32::from_le_bytes(first[at..at + 4].try_into().unwrap());
            let tag_b = u32::from_le_bytes(second[at..at + 4].try_into().unwrap());
            // tags start at 1, increase by one, and ignore the values
            assert_eq!(tag_a, (idx + 1) as u32);
            assert_eq!(tag_a, tag_b);
        }
        let value = i32::from_le_bytes(
            first[layout.centroid_offset + 4..layout.centroid_offset + 8]
                .try_into()
                .unwrap(),
        );
        assert_eq!(value, 7);
    }

    #[test]
    fn test_point_round_trip() {
        let layout = BufferLayout::new(5, 2, 3).unwrap();
        let coords: Vec<i16> = vec![0, -1, 2, 300, -400, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14];
        let mut buffer = vec![0u8; layout.input_bytes()];
        layout.encode_points(&mut buffer, &coords);
        let decoded: Vec<i16> = (0..coords.len())
            .map(|idx| {
                let at = layout.point_offset + idx * 2;
                i16::from_le_bytes(buffer[at..at + 2].try_into().unwrap())
            })
            .collect();
        assert_eq!(decoded, coords);
    }

    #[test]
    fn test_decode_labels_drops_padding() {
        let layout = BufferLayout::new(4, 2, 1).unwrap();
        // 4 points in one line leave 28 padded point slots, all labelled
        let mut output = vec![9u8; layout.output_bytes];
        output[0] = 0;
        output[1] = 0;
        output[2] = 1;
        output[3] = 1;
        assert_eq!(layout.decode_labels(&output), &[0, 0, 1, 1]);
    }
}
