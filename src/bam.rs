//! Alignment access and read filtering

use crate::{InvertypeError, InvertypeResult};
use rust_htslib::bam::{IndexedReader, Read, Record};
use rust_htslib::bam::ext::BamRecordExtensions;
use std::path::Path;

/// A reference contig with its length
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contig {
    pub name: String,
    pub length: u64,
}

impl Contig {
    pub fn new(name: String, length: u64) -> Self {
        Self { name, length }
    }
}

/// The subset of an alignment record the counters look at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadRecord {
    /// 0-based position of the read's 5' end on the reference
    pub five_prime: u64,
    pub is_reverse: bool,
    pub mapq: u8,
    pub is_paired: bool,
    pub is_proper_pair: bool,
    pub is_unmapped: bool,
    pub is_duplicate: bool,
    pub is_first_in_template: bool,
}

impl ReadRecord {
    pub fn from_bam(record: &Record) -> Self {
        let is_reverse = record.is_reverse();
        let five_prime = if is_reverse {
            (record.reference_end() - 1).max(record.pos())
        } else {
            record.pos()
        };

        Self {
            five_prime: five_prime.max(0) as u64,
            is_reverse,
            mapq: record.mapq(),
            is_paired: record.is_paired(),
            is_proper_pair: record.is_proper_pair(),
            is_unmapped: record.is_unmapped(),
            is_duplicate: record.is_duplicate(),
            is_first_in_template: record.is_first_in_template(),
        }
    }
}

/// Which of the two fixed read filters applies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PairingMode {
    #[default]
    Paired,
    Unpaired,
}

impl PairingMode {
    /// Whether a read is counted at all
    pub fn accepts(self, read: &ReadRecord, min_mapq: u8) -> bool {
        if read.is_unmapped || read.is_duplicate || read.mapq <= min_mapq {
            return false;
        }

        match self {
            PairingMode::Paired => {
                read.is_paired && read.is_proper_pair && read.is_first_in_template
            }
            PairingMode::Unpaired => !read.is_paired,
        }
    }

    /// Add a read to the forward or reverse bucket if it passes the filter
    pub fn tally(self, read: &ReadRecord, min_mapq: u8, counts: &mut crate::StrandCounts) -> bool {
        if !self.accepts(read, min_mapq) {
            return false;
        }
        if read.is_reverse {
            counts.add_reverse();
        } else {
            counts.add_forward();
        }
        true
    }
}

/// Read-only access to the mapped reads of one composite file
pub trait AlignmentSource {
    /// Reference contigs in header order
    fn contigs(&self) -> Vec<Contig>;

    /// Call `visitor` for every read overlapping [start, end) on `contig`
    fn visit_region(
        &mut self,
        contig: &str,
        start: u64,
        end: u64,
        visitor: &mut dyn FnMut(&ReadRecord),
    ) -> InvertypeResult<()>;
}

/// Indexed BAM file backed by htslib
pub struct BamSource {
    reader: IndexedReader,
}

impl BamSource {
    pub fn open<P: AsRef<Path>>(bam_path: P) -> InvertypeResult<Self> {
        let bam_path = bam_path.as_ref();

        let bai_path = bam_path.with_extension("bam.bai");
        let alt_bai_path = bam_path.with_extension("bai");

        let reader = if bai_path.exists() {
            IndexedReader::from_path_and_index(bam_path, &bai_path)?
        } else if alt_bai_path.exists() {
            IndexedReader::from_path_and_index(bam_path, &alt_bai_path)?
        } else {
            return Err(InvertypeError::FileNotFound(format!(
                "BAM index file not found. Expected {} or {}",
                bai_path.display(),
                alt_bai_path.display()
            )));
        };

        Ok(BamSource { reader })
    }
}

impl AlignmentSource for BamSource {
    fn contigs(&self) -> Vec<Contig> {
        let header = self.reader.header();
        (0..header.target_count())
            .map(|tid| {
                Contig::new(
                    String::from_utf8_lossy(header.tid2name(tid)).to_string(),
                    header.target_len(tid).unwrap_or(0),
                )
            })
            .collect()
    }

    fn visit_region(
        &mut self,
        contig: &str,
        start: u64,
        end: u64,
        visitor: &mut dyn FnMut(&ReadRecord),
    ) -> InvertypeResult<()> {
        let tid = self
            .reader
            .header()
            .tid(contig.as_bytes())
            .ok_or_else(|| InvertypeError::Input(format!("Unknown contig: {}", contig)))?;

        self.reader.fetch((tid, start as i64, end as i64))?;

        let mut record = Record::new();
        while let Some(result) = self.reader.read(&mut record) {
            result?;
            visitor(&ReadRecord::from_bam(&record));
        }

        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::mock::{write_bam, MemorySource};
    use super::*;
    use crate::StrandCounts;
    use std::fs::File;
    use tempfile::{tempdir, NamedTempFile};

    #[test]
    fn test_paired_filter() {
        let read = MemorySource::good_read(100, false);
        assert!(PairingMode::Paired.accepts(&read, 10));
        assert!(!PairingMode::Unpaired.accepts(&read, 10));

        let second_mate = ReadRecord {
            is_first_in_template: false,
            ..read
        };
        assert!(!PairingMode::Paired.accepts(&second_mate, 10));

        let improper = ReadRecord {
            is_proper_pair: false,
            ..read
        };
        assert!(!PairingMode::Paired.accepts(&improper, 10));

        let duplicate = ReadRecord {
            is_duplicate: true,
            ..read
        };
        assert!(!PairingMode::Paired.accepts(&duplicate, 10));

        let unmapped = ReadRecord {
            is_unmapped: true,
            ..read
        };
        assert!(!PairingMode::Paired.accepts(&unmapped, 10));
    }

    #[test]
    fn test_unpaired_filter() {
        let read = ReadRecord {
            is_paired: false,
            is_proper_pair: false,
            is_first_in_template: false,
            ..MemorySource::good_read(100, true)
        };
        assert!(PairingMode::Unpaired.accepts(&read, 10));
        assert!(!PairingMode::Paired.accepts(&read, 10));

        let duplicate = ReadRecord {
            is_duplicate: true,
            ..read
        };
        assert!(!PairingMode::Unpaired.accepts(&duplicate, 10));
    }

    #[test]
    fn test_mapq_threshold_is_strict() {
        let at_threshold = ReadRecord {
            mapq: 10,
            ..MemorySource::good_read(0, false)
        };
        let above = ReadRecord {
            mapq: 11,
            ..at_threshold
        };
        assert!(!PairingMode::Paired.accepts(&at_threshold, 10));
        assert!(PairingMode::Paired.accepts(&above, 10));
    }

    #[test]
    fn test_tally_uses_one_bucket() {
        let mut counts = StrandCounts::default();
        assert!(PairingMode::Paired.tally(&MemorySource::good_read(5, false), 10, &mut counts));
        assert!(PairingMode::Paired.tally(&MemorySource::good_read(6, true), 10, &mut counts));
        let rejected = ReadRecord {
            mapq: 0,
            ..MemorySource::good_read(7, true)
        };
        assert!(!PairingMode::Paired.tally(&rejected, 10, &mut counts));
        assert_eq!(counts, StrandCounts::new(1, 1));
    }

    #[test]
    fn test_bam_source_index_detection() {
        let temp_bam = NamedTempFile::new().unwrap();

        let result = BamSource::open(temp_bam.path());
        match result {
            Err(InvertypeError::FileNotFound(msg)) => {
                assert!(msg.contains("BAM index file not found"));
                assert!(msg.contains(".bam.bai"));
            }
            _ => panic!("Expected FileNotFound error"),
        }
    }

    #[test]
    fn test_bam_source_rejects_invalid_bam() {
        let temp_bam = NamedTempFile::new().unwrap();
        let bam_path = temp_bam.path();

        // Index present but the BAM itself is empty
        let bai_path = bam_path.with_extension("bai");
        let _temp_bai = File::create(&bai_path).unwrap();

        assert!(BamSource::open(bam_path).is_err());

        std::fs::remove_file(bai_path).ok();
    }

    #[test]
    fn test_memory_source_returns_overlapping_reads() {
        let mut source = MemorySource::new(vec![("chr1", 300)]);
        // Reverse read aligned to [95, 105), 5' end at 104
        source.push("chr1", MemorySource::good_read(104, true));

        let mut seen = Vec::new();
        source
            .visit_region("chr1", 0, 100, &mut |read: &ReadRecord| seen.push(read.five_prime))
            .unwrap();
        source
            .visit_region("chr1", 100, 200, &mut |read: &ReadRecord| seen.push(read.five_prime))
            .unwrap();
        source
            .visit_region("chr1", 200, 300, &mut |read: &ReadRecord| seen.push(read.five_prime))
            .unwrap();
        assert_eq!(seen, vec![104, 104]);
    }

    #[test]
    fn test_bam_source_reads_five_prime_ends() {
        let dir = tempdir().unwrap();
        let bam_path = dir.path().join("composite.bam");
        write_bam(&bam_path, &[(10, false), (95, true)]).unwrap();

        let mut source = BamSource::open(&bam_path).unwrap();
        assert_eq!(source.contigs(), vec![Contig::new("chr1".into(), 300)]);

        let mut reads = Vec::new();
        source
            .visit_region("chr1", 0, 100, &mut |read: &ReadRecord| reads.push(*read))
            .unwrap();

        assert_eq!(reads.len(), 2);
        assert_eq!(reads[0].five_prime, 10);
        assert!(!reads[0].is_reverse);
        assert_eq!(reads[1].five_prime, 104);
        assert!(reads[1].is_reverse);
        assert!(reads.iter().all(|r| PairingMode::Paired.accepts(r, 10)));

        assert!(matches!(
            source.visit_region("chrZ", 0, 10, &mut |_: &ReadRecord| {}),
            Err(InvertypeError::Input(_))
        ));
    }
}
