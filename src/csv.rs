//! Legacy CSV dump/restore of class files.
//!
//! Every 12-byte record of the file, header region included, becomes one
//! `hash;key;value` line; the first two lines therefore carry the header
//! fields reinterpreted as bucket triples. The shape is preserved exactly
//! so `restore(dump(f))` reproduces `f` byte for byte.

use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::class::{DB_VERSION, HEADER_BUCKETS};
use crate::error::{OsbfError, Result};

/// Writes the class file `cfc` out as CSV rows.
pub fn dump(cfc: &Path, csv: &Path) -> Result<()> {
    let file = File::open(cfc).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => OsbfError::FileNotFound(cfc.to_owned()),
        _ => OsbfError::io(cfc, e),
    })?;
    let mut reader = BufReader::new(file);

    let version = reader
        .read_u32::<LittleEndian>()
        .map_err(|e| OsbfError::io(cfc, e))?;
    let db_flags = reader
        .read_u32::<LittleEndian>()
        .map_err(|e| OsbfError::io(cfc, e))?;
    let buckets_start = reader
        .read_u32::<LittleEndian>()
        .map_err(|e| OsbfError::io(cfc, e))?;
    let num_buckets = reader
        .read_u32::<LittleEndian>()
        .map_err(|e| OsbfError::io(cfc, e))?;
    if version != DB_VERSION || db_flags != 0 || buckets_start != HEADER_BUCKETS {
        return Err(OsbfError::format(cfc, "wrong version or flags"));
    }

    reader
        .seek(SeekFrom::Start(0))
        .map_err(|e| OsbfError::io(cfc, e))?;

    let total = u64::from(buckets_start) + u64::from(num_buckets);
    let out = File::create(csv).map_err(|e| OsbfError::io(csv, e))?;
    let mut writer = BufWriter::new(out);
    for _ in 0..total {
        let record = read_record(&mut reader)
            .map_err(|_| OsbfError::format(cfc, "truncated bucket array"))?;
        writeln!(writer, "{};{};{}", record.0, record.1, record.2)
            .map_err(|e| OsbfError::io(csv, e))?;
    }
    // anything left over means the header geometry lied
    let mut probe = [0u8; 1];
    let trailing = reader.read(&mut probe).map_err(|e| OsbfError::io(cfc, e))?;
    if trailing != 0 {
        return Err(OsbfError::format(cfc, "trailing bytes after bucket array"));
    }
    writer.flush().map_err(|e| OsbfError::io(csv, e))?;
    Ok(())
}

/// Rebuilds a class file from CSV rows produced by [`dump`].
///
/// The decoded header is validated before anything is written; a
/// half-written destination is removed on any later mismatch.
pub fn restore(cfc: &Path, csv: &Path) -> Result<()> {
    let file = File::open(csv).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => OsbfError::FileNotFound(csv.to_owned()),
        _ => OsbfError::io(csv, e),
    })?;
    let mut lines = BufReader::new(file).lines();

    let first = next_row(&mut lines, csv)?;
    let second = next_row(&mut lines, csv)?;
    let (version, db_flags, buckets_start) = first;
    let (num_buckets, _learnings, _mistakes) = second;
    if version != DB_VERSION || db_flags != 0 || buckets_start != HEADER_BUCKETS {
        return Err(OsbfError::format(csv, "not a class dump header"));
    }
    if num_buckets == 0 {
        return Err(OsbfError::format(csv, "empty bucket array"));
    }

    let total = u64::from(buckets_start) + u64::from(num_buckets);
    let out = File::create(cfc).map_err(|e| OsbfError::io(cfc, e))?;
    let mut writer = BufWriter::new(out);

    let result = (|| {
        let mut written = 0u64;
        for row in std::iter::once(Ok(first))
            .chain(std::iter::once(Ok(second)))
            .chain(std::iter::from_fn(|| match lines.next() {
                Some(line) => Some(
                    line.map_err(|e| OsbfError::io(csv, e))
                        .and_then(|l| parse_row(&l, csv)),
                ),
                None => None,
            }))
        {
            let (hash, key, value) = row?;
            if written == total {
                return Err(OsbfError::format(csv, "more rows than the header declares"));
            }
            let io_err = |e| OsbfError::io(cfc, e);
            writer.write_u32::<LittleEndian>(hash).map_err(io_err)?;
            writer.write_u32::<LittleEndian>(key).map_err(io_err)?;
            writer.write_u32::<LittleEndian>(value).map_err(io_err)?;
            written += 1;
        }
        if written != total {
            return Err(OsbfError::format(csv, "fewer rows than the header declares"));
        }
        writer.flush().map_err(|e| OsbfError::io(cfc, e))
    })();

    if result.is_err() {
        let _ = fs::remove_file(cfc);
    }
    result
}

fn read_record(reader: &mut impl Read) -> std::io::Result<(u32, u32, u32)> {
    let hash = reader.read_u32::<LittleEndian>()?;
    let key = reader.read_u32::<LittleEndian>()?;
    let value = reader.read_u32::<LittleEndian>()?;
    Ok((hash, key, value))
}

fn next_row(
    lines: &mut impl Iterator<Item = std::io::Result<String>>,
    csv: &Path,
) -> Result<(u32, u32, u32)> {
    match lines.next() {
        Some(Ok(line)) => parse_row(&line, csv),
        Some(Err(e)) => Err(OsbfError::io(csv, e)),
        None => Err(OsbfError::format(csv, "missing header rows")),
    }
}

fn parse_row(line: &str, csv: &Path) -> Result<(u32, u32, u32)> {
    let mut fields = line.split(';');
    let parse = |field: Option<&str>| -> Option<u32> { field?.trim().parse().ok() };
    let hash = parse(fields.next());
    let key = parse(fields.next());
    let value = parse(fields.next());
    match (hash, key, value, fields.next()) {
        (Some(h), Some(k), Some(v), None) => Ok((h, k, v)),
        _ => Err(OsbfError::format(csv, format!("bad row: {:?}", line))),
    }
}
