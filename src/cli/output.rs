// Output formatting for CLI

use crate::cli::config::OutputFormat;
use crate::cli::CliResult;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use oxitag::chunk::ChunkInfo;
use oxitag::{AnyTag, FileType, TagField};
use serde::Serialize;
use std::io::Write;
use std::path::Path;

/// One field as shown to the user
#[derive(Debug, Serialize)]
pub struct FieldRecord {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(flatten)]
    pub value: FieldValue,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FieldValue {
    Text {
        text: String,
    },
    Binary {
        base64: String,
        len: usize,
    },
    Picture {
        mime_type: String,
        picture_type: u32,
        description: String,
        width: u32,
        height: u32,
        len: usize,
    },
}

impl FieldRecord {
    pub fn new(tag: &AnyTag, field: &TagField) -> Self {
        let value = if let Some(artwork) = field.artwork() {
            FieldValue::Picture {
                mime_type: artwork.mime_type.clone(),
                picture_type: artwork.picture_type,
                description: artwork.description.clone(),
                width: artwork.width,
                height: artwork.height,
                len: artwork.data.len(),
            }
        } else if let Some(text) = field.content() {
            FieldValue::Text { text }
        } else {
            FieldValue::Binary {
                base64: STANDARD.encode(field.raw()),
                len: field.raw().len(),
            }
        };
        FieldRecord {
            id: field.id().to_string(),
            key: tag.field_key(field.id()).map(|key| key.to_string()),
            value,
        }
    }

    fn display_value(&self) -> String {
        match &self.value {
            FieldValue::Text { text } => text.clone(),
            FieldValue::Binary { len, .. } => format!("<{} bytes>", len),
            FieldValue::Picture { mime_type, len, .. } => format!("<{} picture, {} bytes>", mime_type, len),
        }
    }
}

/// Tag of one file
#[derive(Debug, Serialize)]
pub struct TagReport {
    pub path: String,
    pub format: FileType,
    pub fields: Vec<FieldRecord>,
}

impl TagReport {
    pub fn new(path: &Path, tag: &AnyTag) -> Self {
        TagReport {
            path: path.display().to_string(),
            format: tag.file_type(),
            fields: tag
                .fields()
                .iter()
                .map(|field| FieldRecord::new(tag, field))
                .collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ChunkRow {
    pub id: String,
    pub offset: u64,
    pub length: u64,
    pub handled: bool,
}

impl From<ChunkInfo<String>> for ChunkRow {
    fn from(chunk: ChunkInfo<String>) -> Self {
        ChunkRow {
            id: chunk.id,
            offset: chunk.offset,
            length: chunk.length,
            handled: chunk.handled,
        }
    }
}

/// Format and output data
pub struct OutputFormatter {
    format: OutputFormat,
    pub quiet: bool,
}

impl OutputFormatter {
    pub fn new(format: OutputFormat, quiet: bool) -> Self {
        Self { format, quiet }
    }

    fn write_json<T: Serialize>(&self, value: &T, writer: &mut dyn Write) -> CliResult<()> {
        match self.format {
            OutputFormat::Json => writeln!(writer, "{}", serde_json::to_string(value)?)?,
            _ => writeln!(writer, "{}", serde_json::to_string_pretty(value)?)?,
        }
        Ok(())
    }

    pub fn output_tag(&self, report: &TagReport, writer: &mut dyn Write) -> CliResult<()> {
        match self.format {
            OutputFormat::KeyValue => {
                writeln!(writer, "# {} ({})", report.path, report.format)?;
                for field in &report.fields {
                    let name = field.key.as_deref().unwrap_or(&field.id);
                    writeln!(writer, "{}={}", name, field.display_value())?;
                }
                Ok(())
            }
            _ => self.write_json(report, writer),
        }
    }

    pub fn output_chunks(&self, chunks: &[ChunkRow], writer: &mut dyn Write) -> CliResult<()> {
        match self.format {
            OutputFormat::KeyValue => {
                for chunk in chunks {
                    let marker = if chunk.handled { "*" } else { " " };
                    writeln!(
                        writer,
                        "{:>10} {:>10} {} {}",
                        chunk.offset, chunk.length, marker, chunk.id
                    )?;
                }
                Ok(())
            }
            _ => self.write_json(&chunks, writer),
        }
    }

    /// Key-value pairs, or a JSON object of them
    pub fn output_pairs(&self, pairs: &[(String, String)], writer: &mut dyn Write) -> CliResult<()> {
        match self.format {
            OutputFormat::KeyValue => {
                for (key, value) in pairs {
                    writeln!(writer, "{}: {}", key, value)?;
                }
                Ok(())
            }
            _ => {
                let object: serde_json::Map<String, serde_json::Value> = pairs
                    .iter()
                    .map(|(key, value)| (key.clone(), serde_json::Value::String(value.clone())))
                    .collect();
                self.write_json(&object, writer)
            }
        }
    }

    /// Print success message
    pub fn print_success(&self, message: &str) {
        if !self.quiet {
            println!("✓ {}", message);
        }
    }

    /// Print error message
    pub fn print_error(&self, message: &str) {
        eprintln!("✗ {}", message);
    }

    /// Print info message
    pub fn print_info(&self, message: &str) {
        if !self.quiet {
            println!("  {}", message);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxitag::FieldKey;

    fn sample() -> AnyTag {
        let mut tag = AnyTag::new(FileType::Flac);
        tag.set(FieldKey::Title, "Song").unwrap();
        if let AnyTag::Flac(flac) = &mut tag {
            flac.add_field(TagField::binary("X-BLOB", vec![1, 2, 3]));
        }
        tag
    }

    #[test]
    fn test_json_report() {
        let report = TagReport::new(Path::new("a.flac"), &sample());
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["format"], "flac");
        assert_eq!(json["fields"][0]["key"], "title");
        assert_eq!(json["fields"][0]["type"], "text");
        assert_eq!(json["fields"][1]["base64"], "AQID");
        assert!(json["fields"][1].get("key").is_none());
    }

    #[test]
    fn test_key_value_output() {
        let report = TagReport::new(Path::new("a.flac"), &sample());
        let mut out = Vec::new();
        OutputFormatter::new(OutputFormat::KeyValue, false)
            .output_tag(&report, &mut out)
            .unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("title=Song\n"));
        assert!(text.contains("X-BLOB=<3 bytes>\n"));
    }
}
