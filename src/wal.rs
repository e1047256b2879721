use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::marker::PhantomData;
use std::path::Path;

use serde::Serialize;
use serde::de::DeserializeOwned;

/// Encode a single record to [len][bincode][crc32] format.
fn encode_record<T: Serialize>(writer: &mut impl Write, record: &T) -> io::Result<()> {
    let payload =
        bincode::serialize(record).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let len = payload.len() as u32;
    let crc = crc32fast::hash(&payload);
    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(&payload)?;
    writer.write_all(&crc.to_le_bytes())?;
    Ok(())
}

/// Append-only write-ahead log over bincode records. The reservation store
/// logs `model::Event`; the outbox logs `model::BookingEvent` with the same
/// framing.
///
/// Format per entry: `[u32: len][bincode payload][u32: crc32]`
/// - `len` is the byte length of the bincode payload (not including the CRC).
/// - Truncated last entry (crash) is safely discarded via length-prefix + CRC check.
///
/// Records are immutable and never deleted, so the log only grows and never
/// needs rewriting.
pub struct Wal<T> {
    writer: BufWriter<File>,
    appended: u64,
    _record: PhantomData<T>,
}

impl<T: Serialize + DeserializeOwned> Wal<T> {
    /// Open (or create) the WAL file at `path`.
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            writer: BufWriter::new(file),
            appended: 0,
            _record: PhantomData,
        })
    }

    /// Append a single record and fsync. Used by tests only — production code
    /// uses `append_buffered` + `flush_sync` for group commit.
    #[cfg(test)]
    pub fn append(&mut self, record: &T) -> io::Result<()> {
        self.append_buffered(record)?;
        self.flush_sync()
    }

    /// Append a single record to the BufWriter without flushing or syncing.
    /// Call `flush_sync()` after the batch to durably commit all buffered records.
    pub fn append_buffered(&mut self, record: &T) -> io::Result<()> {
        encode_record(&mut self.writer, record)?;
        self.appended += 1;
        Ok(())
    }

    /// Flush the BufWriter and fsync the underlying file.
    pub fn flush_sync(&mut self) -> io::Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()
    }

    pub fn appended(&self) -> u64 {
        self.appended
    }

    /// Replay the WAL from disk, returning all valid records.
    /// Truncated/corrupt trailing entries are silently discarded.
    pub fn replay(path: &Path) -> io::Result<Vec<T>> {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        let mut reader = BufReader::new(file);
        let mut records = Vec::new();

        loop {
            // Read length prefix
            let mut len_buf = [0u8; 4];
            match reader.read_exact(&mut len_buf) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e),
            }
            let len = u32::from_le_bytes(len_buf) as usize;

            // Read payload
            let mut payload = vec![0u8; len];
            match reader.read_exact(&mut payload) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break, // truncated
                Err(e) => return Err(e),
            }

            // Read CRC
            let mut crc_buf = [0u8; 4];
            match reader.read_exact(&mut crc_buf) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break, // truncated
                Err(e) => return Err(e),
            }
            let stored_crc = u32::from_le_bytes(crc_buf);
            let computed_crc = crc32fast::hash(&payload);

            if stored_crc != computed_crc {
                // Corrupt entry — stop replaying
                break;
            }

            match bincode::deserialize::<T>(&payload) {
                Ok(record) => records.push(record),
                Err(_) => break, // corrupt payload
            }
        }

        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DateRange, Event};
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use std::fs;
    use std::path::PathBuf;
    use ulid::Ulid;

    fn tmp_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("lodge_test_wal");
        fs::create_dir_all(&dir).unwrap();
        dir.join(name)
    }

    fn july(day: u32) -> chrono::NaiveDate {
        chrono::NaiveDate::from_ymd_opt(2024, 7, day).unwrap()
    }

    fn sample_events() -> Vec<Event> {
        let hotel_id = Ulid::new();
        let room_id = Ulid::new();
        vec![
            Event::HotelAdded {
                id: hotel_id,
                name: "Grand Budapest".into(),
                location: "Zubrowka".into(),
            },
            Event::RoomAdded {
                id: room_id,
                hotel_id,
                room_number: "713".into(),
                capacity: 2,
                rate: dec!(120.00),
            },
            Event::ReservationCreated {
                id: Ulid::new(),
                room_id,
                user_id: Ulid::new(),
                range: DateRange::new(july(20), july(23)).unwrap(),
                total_price: dec!(360.00),
                created_at: Utc::now(),
            },
        ]
    }

    #[test]
    fn append_and_replay() {
        let path = tmp_path("append_and_replay.wal");
        let _ = fs::remove_file(&path);

        let events = sample_events();
        {
            let mut wal = Wal::open(&path).unwrap();
            for e in &events {
                wal.append(e).unwrap();
            }
        }

        let replayed = Wal::<Event>::replay(&path).unwrap();
        assert_eq!(replayed, events);

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn replay_handles_truncation() {
        let path = tmp_path("truncation.wal");
        let _ = fs::remove_file(&path);

        let event = sample_events().remove(0);
        {
            let mut wal = Wal::open(&path).unwrap();
            wal.append(&event).unwrap();
        }

        // Append garbage to simulate a truncated second entry
        {
            let mut f = OpenOptions::new().append(true).open(&path).unwrap();
            f.write_all(&[0u8; 6]).unwrap(); // partial length + some bytes
        }

        let replayed = Wal::<Event>::replay(&path).unwrap();
        assert_eq!(replayed.len(), 1);
        assert_eq!(replayed[0], event);

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn replay_nonexistent_file() {
        let path = tmp_path("nonexistent.wal");
        let _ = fs::remove_file(&path);
        let replayed = Wal::<Event>::replay(&path).unwrap();
        assert!(replayed.is_empty());
    }

    #[test]
    fn replay_corrupt_crc() {
        let path = tmp_path("corrupt_crc.wal");
        let _ = fs::remove_file(&path);

        let event = sample_events().remove(0);

        // Manually write an entry with bad CRC
        {
            let payload = bincode::serialize(&event).unwrap();
            let len = payload.len() as u32;
            let bad_crc: u32 = 0xDEADBEEF;

            let mut f = File::create(&path).unwrap();
            f.write_all(&len.to_le_bytes()).unwrap();
            f.write_all(&payload).unwrap();
            f.write_all(&bad_crc.to_le_bytes()).unwrap();
        }

        let replayed = Wal::<Event>::replay(&path).unwrap();
        assert!(replayed.is_empty());

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn append_buffered_then_flush_sync() {
        let path = tmp_path("buffered_flush.wal");
        let _ = fs::remove_file(&path);

        let events = sample_events();
        {
            let mut wal = Wal::open(&path).unwrap();
            for e in &events {
                wal.append_buffered(e).unwrap();
            }
            assert_eq!(wal.appended(), 3);
            wal.flush_sync().unwrap();
        }

        let replayed = Wal::<Event>::replay(&path).unwrap();
        assert_eq!(replayed, events);

        let _ = fs::remove_file(&path);
    }
}
