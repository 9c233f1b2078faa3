use anyhow::{Context, Result};
use flate2::write::GzEncoder;
use flate2::Compression;
use log::debug;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use seq_io::fastq::Reader as FastqReader;

/// Open a FASTQ file for streaming, decompressing on the fly.
///
/// The compression format is sniffed from the file content, so plain and
/// gzipped files both work. The returned reader is lazy and single-pass;
/// the decompressed file is never held in memory.
pub fn open_fastq(path: &Path) -> Result<FastqReader<Box<dyn std::io::Read>>> {
    let file =
        File::open(path).with_context(|| format!("Cannot open fastq file {}", path.display()))?;
    let (reader, compression) = niffler::get_reader(Box::new(file))
        .with_context(|| format!("Cannot read fastq file {}", path.display()))?;
    debug!(
        "Opened file {} with compression {:?}",
        path.display(),
        compression
    );
    Ok(FastqReader::new(reader))
}

/// Gzip FASTQ writer for the residual output files. Records pass through
/// verbatim as `@head / seq / + / qual`.
pub struct FastqGzWriter {
    encoder: GzEncoder<BufWriter<File>>,
}

impl FastqGzWriter {
    pub fn create(path: &Path) -> Result<FastqGzWriter> {
        let file = File::create(path)
            .with_context(|| format!("Cannot create output file {}", path.display()))?;
        Ok(FastqGzWriter {
            encoder: GzEncoder::new(BufWriter::new(file), Compression::default()),
        })
    }

    pub fn write_record(&mut self, head: &[u8], seq: &[u8], qual: &[u8]) -> Result<()> {
        self.encoder.write_all(b"@")?;
        self.encoder.write_all(head)?;
        self.encoder.write_all(b"\n")?;
        self.encoder.write_all(seq)?;
        self.encoder.write_all(b"\n+\n")?;
        self.encoder.write_all(qual)?;
        self.encoder.write_all(b"\n")?;
        Ok(())
    }

    pub fn finish(self) -> Result<()> {
        let mut inner = self.encoder.finish()?;
        inner.flush()?;
        Ok(())
    }
}
