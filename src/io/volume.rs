use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::error::Error;
use crate::volume::TsdfVolume;

/// Writes the volume distances as a flat stream of little endian `f32`
/// values, x fastest, then y, then z. Weights are not stored.
pub fn dump_volume(volume: &TsdfVolume, path: &Path) -> Result<(), Error> {
    let mut writer = BufWriter::new(File::create(path)?);
    for voxel in volume.voxels() {
        writer.write_all(&voxel.tsdf.to_le_bytes())?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use nalgebra::Vector3;

    use super::dump_volume;
    use crate::volume::TsdfVolume;

    #[test]
    fn test_dump_layout() {
        let mut volume = TsdfVolume::new([4, 3, 2], Vector3::new(1.0, 1.0, 1.0));
        let index = 1 + 2 * 4 + 1 * 4 * 3;
        volume.voxels_mut()[index].tsdf = -0.25;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("volume.bin");
        dump_volume(&volume, &path).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(bytes.len(), 4 * 3 * 2 * 4);

        // Voxel (1, 2, 1) lands at offset 4 * (x + y*sx + z*sx*sy).
        let offset = 4 * index;
        let value = f32::from_le_bytes([
            bytes[offset],
            bytes[offset + 1],
            bytes[offset + 2],
            bytes[offset + 3],
        ]);
        assert_eq!(value, -0.25);
        // Untouched voxels keep the free space distance.
        let first = f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        assert_eq!(first, 1.0);
    }
}
