use std::error::Error;
use std::fs::File;
use std::io::Read;

/// the points to be clustered, immutable once loaded.
///
/// coordinates are stored flat, point major, dimension minor, exactly
/// `num_points * num_dims` entries. a file with fewer lines than
/// `num_points` leaves the remaining coordinates zero.
#[derive(Debug)]
pub struct PointSet {
    coords: Vec<i16>,
    num_points: usize,
    num_dims: usize,
}

impl PointSet {
    ///
    /// # Arguments
    /// * file_name - the name of the file to read
    /// * num_points - the number of point lines to consume
    /// * num_dims - the number of coordinates per point
    /// # return
    /// * PointSet - the loaded coordinates
    ///
    /// # Description
    /// reads a text file with one point per line. commas count as
    /// whitespace. the first token of each line is an identifier and is
    /// discarded, the next `num_dims` tokens are the coordinates. lines
    /// beyond `num_points` are ignored.
    /// example file format:
    /// 0 12 7
    /// 1 -3,44
    /// 2 100 100
    pub fn new(file_name: &str, num_points: usize, num_dims: usize) -> Result<Self, Box<dyn Error>> {
        let mut file = File::open(file_name)?;
        let mut contents = String::new();
        file.read_to_string(&mut contents)?;

        let mut coords = vec![0i16; num_points * num_dims];
        for (point, line) in contents.lines().take(num_points).enumerate() {
            let mut tokens = line
                .split(|c: char| c.is_whitespace() || c == ',')
                .filter(|t| !t.is_empty());
            // the first token is the point id, not a coordinate
            if tokens.next().is_none() {
                continue;
            }
            for (dim, token) in tokens.take(num_dims).enumerate() {
                coords[point * num_dims + dim] = token.parse::<i16>()?;
            }
        }

        Ok(PointSet {
            coords,
            num_points,
            num_dims,
        })
    }

    /// build a point set from coordinates already in memory.
    pub fn from_coords(coords: Vec<i16>, num_dims: usize) -> Result<Self, Box<dyn Error>> {
        if num_dims == 0 {
            return Err("num_dims must be greater than 0".into());
        }
        if coords.len() % num_dims != 0 {
            return Err("the number of coordinates is not a multiple of num_dims".into());
        }
        let num_points = coords.len() / num_dims;
        Ok(PointSet {
            coords,
            num_points,
            num_dims,
        })
    }
}

impl PointSet {
    pub fn coords(&self) -> &[i16] {
        &self.coords
    }
    pub fn point(&self, point: usize) -> &[i16] {
        &self.coords[point * self.num_dims..(point + 1) * self.num_dims]
    }
    pub fn num_dims(&self) -> usize {
        self.num_dims
    }
    pub fn len(&self) -> usize {
        self.num_points
    }
    pub fn is_empty(&self) -> bool {
        self.num_points == 0
    }
}
