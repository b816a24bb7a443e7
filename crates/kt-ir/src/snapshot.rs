//! Opaque song snapshot: the byte blob shipped by the file-fetch RPC.

use std::fmt;

use crate::song::Song;

const MAGIC: &[u8; 4] = b"KTSN";
const VERSION: u8 = 1;

/// Error type for snapshot decoding.
#[derive(Debug)]
pub enum SnapshotError {
    /// Missing or wrong magic bytes
    BadMagic,
    /// Snapshot written by an unknown format version
    UnsupportedVersion(u8),
    /// Body failed to decode
    Decode(String),
}

impl fmt::Display for SnapshotError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadMagic => write!(f, "not a song snapshot"),
            Self::UnsupportedVersion(v) => write!(f, "unsupported snapshot version {}", v),
            Self::Decode(e) => write!(f, "snapshot decode failed: {}", e),
        }
    }
}

impl std::error::Error for SnapshotError {}

/// Serialize a song to an opaque byte blob.
pub fn save_song(song: &Song) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(MAGIC);
    out.push(VERSION);
    match rmp_serde::encode::write_named(&mut out, song) {
        Ok(()) => out,
        Err(e) => {
            // Serialization of an in-memory song only fails on I/O, which a
            // Vec sink cannot produce; keep the header so callers still get
            // a parseable-but-empty blob.
            log::error!("snapshot encode failed: {}", e);
            out.truncate(MAGIC.len() + 1);
            out
        }
    }
}

/// Deserialize a song from a snapshot blob.
pub fn load_song(bytes: &[u8]) -> Result<Song, SnapshotError> {
    if bytes.len() < MAGIC.len() + 1 || &bytes[..MAGIC.len()] != MAGIC {
        return Err(SnapshotError::BadMagic);
    }
    let version = bytes[MAGIC.len()];
    if version != VERSION {
        return Err(SnapshotError::UnsupportedVersion(version));
    }
    let mut song: Song = rmp_serde::from_slice(&bytes[MAGIC.len() + 1..])
        .map_err(|e| SnapshotError::Decode(e.to_string()))?;
    if !song.is_well_formed() {
        return Err(SnapshotError::Decode("mis-sized song containers".into()));
    }
    song.walk_song();
    Ok(song)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instrument::Instrument;

    #[test]
    fn round_trip() {
        let mut song = Song::new();
        song.add_order(None, 0);
        song.add_order(None, 1);
        song.set_order_cell(2, 1, 5);
        song.pattern_mut(2, 5, true).unwrap().set_cell(10, 0, 60);
        song.instruments.push(Instrument::new("lead"));

        let bytes = save_song(&song);
        let loaded = load_song(&bytes).unwrap();

        assert_eq!(loaded.orders_len(), 2);
        assert_eq!(loaded.order_cell(2, 1), 5);
        assert_eq!(loaded.pattern(2, 5).unwrap().cell(10, 0), 60);
        assert_eq!(loaded.instruments.len(), 1);
        assert_eq!(loaded.instruments[0].name.as_str(), "lead");
    }

    #[test]
    fn bad_magic_is_soft_error() {
        assert!(matches!(load_song(b"nope"), Err(SnapshotError::BadMagic)));
        assert!(matches!(load_song(&[]), Err(SnapshotError::BadMagic)));
    }

    #[test]
    fn unknown_version_rejected() {
        let mut bytes = save_song(&Song::new());
        bytes[4] = 99;
        assert!(matches!(
            load_song(&bytes),
            Err(SnapshotError::UnsupportedVersion(99))
        ));
    }

    #[test]
    fn truncated_body_rejected() {
        let bytes = save_song(&Song::new());
        assert!(matches!(
            load_song(&bytes[..bytes.len() / 2]),
            Err(SnapshotError::Decode(_))
        ));
    }
}
