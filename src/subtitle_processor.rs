use std::fmt;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use regex::Regex;
use once_cell::sync::Lazy;
use anyhow::{Result, Context, anyhow};
use log::{debug, warn};

use crate::errors::SubtitleError;
use crate::file_utils::FileManager;

// @module: Subtitle parsing and serialization

// @const: SRT block regex, text is non-greedy up to the next blank line
static BLOCK_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)(\d{2}:\d{2}:\d{2},\d{3})\s+-->\s+(\d{2}:\d{2}:\d{2},\d{3})\n(.*?)\n\n")
        .expect("block regex is valid")
});

// @struct: Single subtitle entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubtitleEntry {
    // @field: Sequence number, reassigned on write
    pub seq_num: usize,

    // @field: Start time in ms
    pub start_time_ms: u64,

    // @field: End time in ms
    pub end_time_ms: u64,

    // @field: Subtitle text, may span lines
    pub text: String,
}

impl SubtitleEntry {
    /// Creates a new subtitle entry
    pub fn new(seq_num: usize, start_time_ms: u64, end_time_ms: u64, text: String) -> Self {
        SubtitleEntry {
            seq_num,
            start_time_ms,
            end_time_ms,
            text,
        }
    }

    /// Parse an SRT timestamp (HH:MM:SS,mmm) to milliseconds
    pub fn parse_timestamp(timestamp: &str) -> Result<u64> {
        let parts: Vec<&str> = timestamp.split(&[':', ',', '.'][..]).collect();

        if parts.len() != 4 {
            return Err(anyhow!("Invalid timestamp format: {}", timestamp));
        }

        let hours: u64 = parts[0].parse().context("Failed to parse hours")?;
        let minutes: u64 = parts[1].parse().context("Failed to parse minutes")?;
        let seconds: u64 = parts[2].parse().context("Failed to parse seconds")?;
        let millis: u64 = parts[3].parse().context("Failed to parse milliseconds")?;

        if minutes >= 60 || seconds >= 60 || millis >= 1000 {
            return Err(anyhow!("Invalid time components in timestamp: {}", timestamp));
        }

        Ok(hours * 3_600_000 + minutes * 60_000 + seconds * 1_000 + millis)
    }

    /// Convert start time to formatted SRT timestamp
    pub fn format_start_time(&self) -> String {
        Self::format_timestamp(self.start_time_ms)
    }

    /// Convert end time to formatted SRT timestamp
    pub fn format_end_time(&self) -> String {
        Self::format_timestamp(self.end_time_ms)
    }

    /// Format a timestamp in milliseconds to SRT format (HH:MM:SS,mmm)
    pub fn format_timestamp(ms: u64) -> String {
        let hours = ms / 3_600_000;
        let minutes = (ms % 3_600_000) / 60_000;
        let seconds = (ms % 60_000) / 1_000;
        let millis = ms % 1_000;

        format!("{:02}:{:02}:{:02},{:03}", hours, minutes, seconds, millis)
    }
}

impl fmt::Display for SubtitleEntry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "{}", self.seq_num)?;
        writeln!(f, "{} --> {}", self.format_start_time(), self.format_end_time())?;
        writeln!(f, "{}", self.text)?;
        writeln!(f)
    }
}

/// Text encodings the codec can decode. Detection is up to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextEncoding {
    #[default]
    Utf8,
    Utf16Le,
    Utf16Be,
    Latin1,
}

impl TextEncoding {
    // @returns: Canonical label
    pub fn label(&self) -> &'static str {
        match self {
            Self::Utf8 => "utf-8",
            Self::Utf16Le => "utf-16le",
            Self::Utf16Be => "utf-16be",
            Self::Latin1 => "latin1",
        }
    }

    /// Decode raw document bytes, dropping a leading byte order mark
    pub fn decode(&self, bytes: &[u8]) -> Result<String, SubtitleError> {
        match self {
            Self::Utf8 => {
                let bytes = bytes.strip_prefix(&[0xEF_u8, 0xBB, 0xBF]).unwrap_or(bytes);
                String::from_utf8(bytes.to_vec()).map_err(|e| self.decoding_error(e.to_string()))
            },
            Self::Utf16Le | Self::Utf16Be => {
                if bytes.len() % 2 != 0 {
                    return Err(self.decoding_error("odd number of bytes".to_string()));
                }
                let units: Vec<u16> = bytes
                    .chunks_exact(2)
                    .map(|pair| match self {
                        Self::Utf16Le => u16::from_le_bytes([pair[0], pair[1]]),
                        _ => u16::from_be_bytes([pair[0], pair[1]]),
                    })
                    .collect();
                let units = units.strip_prefix(&[0xFEFF_u16]).unwrap_or(units.as_slice());
                String::from_utf16(units).map_err(|e| self.decoding_error(e.to_string()))
            },
            Self::Latin1 => Ok(bytes.iter().map(|&b| b as char).collect()),
        }
    }

    fn decoding_error(&self, message: String) -> SubtitleError {
        SubtitleError::Decoding {
            encoding: self.label().to_string(),
            message,
        }
    }
}

impl fmt::Display for TextEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

impl FromStr for TextEncoding {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().replace('_', "-").as_str() {
            "utf-8" | "utf8" | "utf-8-sig" => Ok(Self::Utf8),
            "utf-16le" | "utf-16" | "utf16le" => Ok(Self::Utf16Le),
            "utf-16be" | "utf16be" => Ok(Self::Utf16Be),
            "latin1" | "latin-1" | "iso-8859-1" => Ok(Self::Latin1),
            _ => Err(anyhow!("Unsupported encoding: {}", s)),
        }
    }
}

/// Collection of subtitle entries with metadata
#[derive(Debug, Clone)]
pub struct SubtitleCollection {
    /// Source filename
    pub source_file: PathBuf,

    /// List of subtitle entries
    pub entries: Vec<SubtitleEntry>,

    /// Source language
    pub source_language: String,
}

impl SubtitleCollection {
    /// Create a new subtitle collection
    pub fn new(source_file: PathBuf, source_language: String) -> Self {
        SubtitleCollection {
            source_file,
            entries: Vec::new(),
            source_language,
        }
    }

    /// Read and parse an SRT file with the given encoding
    pub fn read_srt_file<P: AsRef<Path>>(path: P, encoding: TextEncoding, source_language: &str) -> Result<Self> {
        let path = path.as_ref();
        let bytes = FileManager::read_bytes(path)?;
        let entries = Self::parse_document(&bytes, encoding)
            .with_context(|| format!("Failed to parse subtitle file: {}", path.display()))?;

        debug!("Parsed {} entries from {}", entries.len(), path.display());

        Ok(SubtitleCollection {
            source_file: path.to_path_buf(),
            entries,
            source_language: source_language.to_string(),
        })
    }

    /// Decode document bytes and parse them into entries
    pub fn parse_document(bytes: &[u8], encoding: TextEncoding) -> Result<Vec<SubtitleEntry>, SubtitleError> {
        let content = encoding.decode(bytes)?;
        Self::parse_srt_string(&content)
    }

    /// Parse SRT text into entries in order of appearance.
    ///
    /// Sequence numbers in the input are ignored; entries are numbered 1..N.
    pub fn parse_srt_string(content: &str) -> Result<Vec<SubtitleEntry>, SubtitleError> {
        let mut normalized = content.replace("\r\n", "\n");
        // The last block may lack its closing blank line
        while !normalized.ends_with("\n\n") {
            normalized.push('\n');
        }

        let mut entries = Vec::new();
        for caps in BLOCK_REGEX.captures_iter(&normalized) {
            let start = SubtitleEntry::parse_timestamp(&caps[1]);
            let end = SubtitleEntry::parse_timestamp(&caps[2]);
            match (start, end) {
                (Ok(start_ms), Ok(end_ms)) => {
                    entries.push(SubtitleEntry::new(entries.len() + 1, start_ms, end_ms, caps[3].to_string()));
                },
                _ => warn!("Skipping block with invalid timestamps: {} --> {}", &caps[1], &caps[2]),
            }
        }

        if entries.is_empty() {
            let reason = if content.trim().is_empty() {
                "document is empty".to_string()
            } else {
                "no timestamped subtitle blocks found".to_string()
            };
            return Err(SubtitleError::MalformedDocument(reason));
        }

        Ok(entries)
    }

    /// Serialize entries to SRT text, numbering them 1..N
    pub fn serialize_entries(entries: &[SubtitleEntry]) -> String {
        let mut out = String::new();
        for (i, entry) in entries.iter().enumerate() {
            // Writing to a String cannot fail
            let _ = write!(
                out,
                "{}\n{} --> {}\n{}\n\n",
                i + 1,
                entry.format_start_time(),
                entry.format_end_time(),
                entry.text
            );
        }
        out
    }

    /// Serialize this collection to SRT text
    pub fn to_srt_string(&self) -> String {
        Self::serialize_entries(&self.entries)
    }

    /// Write subtitles to an SRT file, fully buffered then persisted in one step
    pub fn write_to_srt<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        FileManager::write_atomic(path, &self.to_srt_string())
            .with_context(|| format!("Failed to write subtitle file: {}", path.display()))
    }
}

impl fmt::Display for SubtitleCollection {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "Subtitle Collection")?;
        writeln!(f, "Source: {:?}", self.source_file)?;
        writeln!(f, "Language: {}", self.source_language)?;
        writeln!(f, "Entries: {}", self.entries.len())?;
        Ok(())
    }
}
