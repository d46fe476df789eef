use std::fs::File;
use std::io::{BufRead, BufWriter, Write};
use std::path::Path;

use itertools::Itertools;
use nalgebra::Matrix4;

use crate::error::Error;
use crate::trajectory::Trajectory;
use crate::transform::Transform;

/// Writes a trajectory in the camera log format: per pose one metadata line
/// `index index index+1`, then the four rows of the camera to world matrix.
pub fn write_trajectory_log(trajectory: &Trajectory, path: &Path) -> Result<(), Error> {
    let mut writer = BufWriter::new(File::create(path)?);
    for (index, (transform, _time)) in trajectory.iter().enumerate() {
        writeln!(writer, "{} {} {}", index, index, index + 1)?;
        let matrix: Matrix4<f32> = (&transform).into();
        for row in 0..4 {
            writeln!(
                writer,
                "{} {} {} {}",
                matrix[(row, 0)],
                matrix[(row, 1)],
                matrix[(row, 2)],
                matrix[(row, 3)]
            )?;
        }
    }
    writer.flush()?;
    Ok(())
}

/// Reads a trajectory written by [`write_trajectory_log`]. Timestamps are the
/// pose indices.
pub fn read_trajectory_log(path: &Path) -> Result<Trajectory, Error> {
    let reader = std::io::BufReader::new(File::open(path)?);
    let lines = reader
        .lines()
        .collect::<Result<Vec<String>, std::io::Error>>()?;

    let mut trajectory = Trajectory::default();
    for (n, block) in lines
        .iter()
        .filter(|line| !line.trim().is_empty())
        .chunks(5)
        .into_iter()
        .enumerate()
    {
        let block: Vec<&String> = block.collect();
        if block.len() != 5 {
            return Err(Error::Parser("truncated trajectory log".to_string()));
        }

        let mut matrix = Matrix4::zeros();
        for (i, line) in block[1..].iter().enumerate() {
            for (j, token) in line.split_whitespace().take(4).enumerate() {
                matrix[(i, j)] = token
                    .parse::<f32>()
                    .map_err(|err| Error::Parser(err.to_string()))?;
            }
        }
        trajectory.push(Transform::from_matrix4(&matrix), n as f32);
    }
    Ok(trajectory)
}
