//! Interval input and genotype call output

use crate::{utils::is_gzipped, Genotype, Interval, IntervalCall, InvertypeError, InvertypeResult};
use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::Serialize;
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::Path;

/// Read candidate intervals from a BED-like file (`contig start end [name]`).
///
/// Coordinates are 0-based half-open. `#` comments and `track`/`browser` lines are skipped.
pub fn read_intervals<P: AsRef<Path>>(path: P) -> InvertypeResult<Vec<Interval>> {
    let file = File::open(&path)
        .map_err(|_| InvertypeError::FileNotFound(path.as_ref().to_string_lossy().to_string()))?;

    let reader: Box<dyn Read> = if is_gzipped(&path)? {
        Box::new(BufReader::new(MultiGzDecoder::new(file)))
    } else {
        Box::new(BufReader::new(file))
    };

    let mut csv_reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .comment(Some(b'#'))
        .flexible(true)
        .from_reader(reader);

    let mut intervals = Vec::new();
    for (line, result) in csv_reader.records().enumerate() {
        let record = result?;

        let first = record.get(0).unwrap_or("").trim();
        let keyword = first.split_whitespace().next().unwrap_or("");
        if keyword.is_empty() || keyword == "track" || keyword == "browser" {
            continue;
        }

        if record.len() < 3 {
            return Err(InvertypeError::Input(format!(
                "interval record {} needs at least 3 columns, got {}",
                line + 1,
                record.len()
            )));
        }

        let parse = |field: &str| {
            field.trim().parse::<u64>().map_err(|_| {
                InvertypeError::Input(format!(
                    "invalid coordinate '{}' in interval record {}",
                    field,
                    line + 1
                ))
            })
        };
        let start = parse(&record[1])?;
        let end = parse(&record[2])?;

        if start >= end {
            return Err(InvertypeError::Input(format!(
                "interval record {} has start {} >= end {}",
                line + 1,
                start,
                end
            )));
        }

        let mut interval = Interval::new(first.to_string(), start, end);
        if let Some(name) = record.get(3).map(str::trim).filter(|n| !n.is_empty()) {
            interval = interval.with_name(name.to_string());
        }
        intervals.push(interval);
    }

    Ok(intervals)
}

#[derive(Serialize)]
struct CallRow<'a> {
    chrom: &'a str,
    start: u64,
    end: u64,
    name: &'a str,
    genotype: &'static str,
    probability: f64,
    p_ref: f64,
    p_het: f64,
    p_hom: f64,
    ww_forward: Option<u64>,
    ww_reverse: Option<u64>,
    wc_forward: Option<u64>,
    wc_reverse: Option<u64>,
    confident: bool,
}

impl<'a> From<&'a IntervalCall> for CallRow<'a> {
    fn from(call: &'a IntervalCall) -> Self {
        Self {
            chrom: &call.interval.contig,
            start: call.interval.start,
            end: call.interval.end,
            name: call.interval.name.as_deref().unwrap_or("."),
            genotype: call.genotype.as_str(),
            probability: call.probability,
            p_ref: call.posterior_of(Genotype::Normal),
            p_het: call.posterior_of(Genotype::HetInverted),
            p_hom: call.posterior_of(Genotype::HomInverted),
            ww_forward: call.ww_counts.map(|c| c.forward),
            ww_reverse: call.ww_counts.map(|c| c.reverse),
            wc_forward: call.wc_counts.map(|c| c.forward),
            wc_reverse: call.wc_counts.map(|c| c.reverse),
            confident: call.confident,
        }
    }
}

/// Write genotype calls to a TSV file, gzip-compressed when the path ends in `.gz`
pub fn write_calls(calls: &[IntervalCall], output_path: &Path) -> InvertypeResult<()> {
    let file = File::create(output_path)?;
    let writer: Box<dyn Write> = if output_path.extension().and_then(|s| s.to_str()) == Some("gz") {
        Box::new(GzEncoder::new(file, Compression::default()))
    } else {
        Box::new(file)
    };

    let mut csv_writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .from_writer(writer);

    if calls.is_empty() {
        csv_writer.write_record([
            "chrom",
            "start",
            "end",
            "name",
            "genotype",
            "probability",
            "p_ref",
            "p_het",
            "p_hom",
            "ww_forward",
            "ww_reverse",
            "wc_forward",
            "wc_reverse",
            "confident",
        ])?;
    }

    for call in calls {
        csv_writer.serialize(CallRow::from(call))?;
    }
    csv_writer.flush()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StrandCounts;
    use flate2::read::GzDecoder;
    use tempfile::NamedTempFile;

    fn call(contig: &str, genotype: Genotype) -> IntervalCall {
        IntervalCall {
            interval: Interval::new(contig.to_string(), 100, 200).with_name("inv1".to_string()),
            posterior: [0.9, 0.08, 0.02],
            genotype,
            probability: 0.9,
            ww_counts: Some(StrandCounts::new(40, 2)),
            wc_counts: None,
            confident: false,
        }
    }

    #[test]
    fn test_read_intervals() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "# candidate inversions").unwrap();
        writeln!(file, "track name=inversions").unwrap();
        writeln!(file, "chr1\t1000\t5000\tinv_a").unwrap();
        writeln!(file, "chr2\t0\t300").unwrap();

        let intervals = read_intervals(file.path()).unwrap();
        assert_eq!(intervals.len(), 2);
        assert_eq!(intervals[0].name.as_deref(), Some("inv_a"));
        assert_eq!(intervals[1], Interval::new("chr2".into(), 0, 300));
    }

    #[test]
    fn test_read_gzipped_intervals() {
        let file = NamedTempFile::new().unwrap();
        {
            let mut encoder =
                GzEncoder::new(File::create(file.path()).unwrap(), Compression::default());
            writeln!(encoder, "chr3\t10\t20").unwrap();
            encoder.finish().unwrap();
        }
        let intervals = read_intervals(file.path()).unwrap();
        assert_eq!(intervals, vec![Interval::new("chr3".into(), 10, 20)]);
    }

    #[test]
    fn test_read_intervals_rejects_bad_records() {
        let mut reversed = NamedTempFile::new().unwrap();
        writeln!(reversed, "chr1\t500\t100").unwrap();
        assert!(matches!(read_intervals(reversed.path()), Err(InvertypeError::Input(_))));

        let mut short = NamedTempFile::new().unwrap();
        writeln!(short, "chr1\t500").unwrap();
        assert!(read_intervals(short.path()).is_err());

        let mut not_a_number = NamedTempFile::new().unwrap();
        writeln!(not_a_number, "chr1\tabc\t100").unwrap();
        assert!(read_intervals(not_a_number.path()).is_err());

        assert!(matches!(
            read_intervals("/nonexistent/intervals.bed"),
            Err(InvertypeError::FileNotFound(_))
        ));
    }

    #[test]
    fn test_write_calls() {
        let output = NamedTempFile::new().unwrap();
        write_calls(&[call("chr1", Genotype::Normal)], output.path()).unwrap();

        let content = std::fs::read_to_string(output.path()).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("chrom\tstart\tend\tname\tgenotype\tprobability"));
        assert_eq!(lines[1], "chr1\t100\t200\tinv1\t0|0\t0.9\t0.9\t0.08\t0.02\t40\t2\t\t\tfalse");
    }

    #[test]
    fn test_write_empty_calls_has_header() {
        let output = NamedTempFile::new().unwrap();
        write_calls(&[], output.path()).unwrap();
        let content = std::fs::read_to_string(output.path()).unwrap();
        assert_eq!(content.lines().count(), 1);
        assert!(content.ends_with("confident\n"));
    }

    #[test]
    fn test_write_gzipped_calls() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("calls.tsv.gz");
        write_calls(&[call("chr2", Genotype::HomInverted)], &path).unwrap();

        let mut decoded = String::new();
        GzDecoder::new(File::open(&path).unwrap())
            .read_to_string(&mut decoded)
            .unwrap();
        assert!(decoded.contains("chr2\t100\t200\tinv1\t1|1"));
    }
}
