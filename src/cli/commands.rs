// CLI command implementations
use crate::cli::config::{Commands, Config};
use crate::cli::output::{ChunkRow, OutputFormatter, TagReport};
use crate::cli::{CliError, CliResult};
use anyhow::Context;
use oxitag::genre::{genre_id, genre_name, genres};
use oxitag::{AnyTag, Artwork, AudioFile, FieldKey, ReadOptions};
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Run the parsed command line
pub fn run(config: &Config) -> CliResult<()> {
    let formatter = OutputFormatter::new(config.format, config.quiet);
    let options = ReadOptions::new().read_artwork(!config.skip_artwork);

    match &config.command {
        Commands::Read { files, output } => command_read(files, output.as_deref(), &options, &formatter),
        Commands::Detect { files } => command_detect(files, &formatter),
        Commands::Chunks { file } => command_chunks(file, &formatter),
        Commands::Set {
            file,
            assignments,
            remove,
        } => command_set(file, assignments, remove, &formatter),
        Commands::ExportCover {
            file,
            output,
            index,
        } => command_export_cover(file, output, *index, &formatter),
        Commands::Genre { query } => command_genre(query.as_deref(), &formatter),
        Commands::Batch { directory, pattern } => command_batch(directory, pattern, &options, &formatter),
        Commands::Info { files } => command_info(files, &formatter),
    }
}

fn open(path: &Path) -> CliResult<AudioFile> {
    if !path.exists() {
        return Err(CliError::FileNotFound(path.display().to_string()));
    }
    Ok(AudioFile::open(path)?)
}

fn parse_key(name: &str) -> CliResult<FieldKey> {
    name.parse::<FieldKey>().map_err(CliError::InvalidArgument)
}

/// Read tags from files
fn command_read(
    files: &[PathBuf],
    output: Option<&Path>,
    options: &ReadOptions,
    formatter: &OutputFormatter,
) -> CliResult<()> {
    let mut writer: Box<dyn Write> = match output {
        Some(path) => Box::new(BufWriter::new(File::create(path)?)),
        None => Box::new(io::stdout()),
    };

    let mut failed = 0;
    for path in files {
        let result = open(path).and_then(|audio| Ok(audio.read_tag(options)?));
        match result {
            Ok(tag) => formatter.output_tag(&TagReport::new(path, &tag), &mut *writer)?,
            Err(e) => {
                formatter.print_error(&format!("{}: {}", path.display(), e));
                failed += 1;
            }
        }
    }
    writer.flush()?;

    if failed > 0 {
        return Err(CliError::Other(format!("{} of {} files failed", failed, files.len())));
    }
    Ok(())
}

/// Detect file format
fn command_detect(files: &[PathBuf], formatter: &OutputFormatter) -> CliResult<()> {
    let mut pairs = Vec::with_capacity(files.len());
    for path in files {
        let detected = match open(path) {
            Ok(audio) => audio.file_type.to_string(),
            Err(CliError::Tag(oxitag::TagError::UnknownFormat)) => "unknown".to_string(),
            Err(e) => return Err(e),
        };
        pairs.push((path.display().to_string(), detected));
    }
    formatter.output_pairs(&pairs, &mut io::stdout())
}

/// List top-level chunks
fn command_chunks(file: &Path, formatter: &OutputFormatter) -> CliResult<()> {
    let chunks: Vec<ChunkRow> = open(file)?
        .chunks()?
        .into_iter()
        .map(ChunkRow::from)
        .collect();
    formatter.output_chunks(&chunks, &mut io::stdout())
}

/// Apply removals, then `KEY=VALUE` assignments, and rewrite the file
fn command_set(
    file: &Path,
    assignments: &[String],
    remove: &[String],
    formatter: &OutputFormatter,
) -> CliResult<()> {
    if assignments.is_empty() && remove.is_empty() {
        return Err(CliError::InvalidArgument("nothing to set or remove".into()));
    }

    let audio = open(file)?;
    let mut tag = audio.read_tag(&ReadOptions::default())?;

    for name in remove {
        tag.delete(parse_key(name)?)?;
    }

    // repeated keys add further values instead of replacing
    let mut assigned = Vec::new();
    for assignment in assignments {
        let (name, value) = assignment.split_once('=').ok_or_else(|| {
            CliError::InvalidArgument(format!("expected KEY=VALUE, got {:?}", assignment))
        })?;
        let key = parse_key(name)?;
        if key == FieldKey::Cover {
            let data = fs::read(value)
                .with_context(|| format!("reading cover image {}", value))?;
            tag.set_artwork(Artwork::from_image(data))?;
        } else if assigned.contains(&key) {
            tag.add(key, value)?;
        } else {
            tag.set(key, value)?;
            assigned.push(key);
        }
    }

    debug!(fields = tag.len(), "writing tag");
    audio.write_tag(&tag)?;
    formatter.print_success(&format!("Updated {}", file.display()));
    Ok(())
}

fn cover_file_name(file: &Path, index: usize, count: usize, artwork: &Artwork) -> String {
    let stem = file
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "cover".to_string());
    if count > 1 {
        format!("{}-{}.{}", stem, index + 1, artwork.extension())
    } else {
        format!("{}.{}", stem, artwork.extension())
    }
}

/// Export cover art
fn command_export_cover(
    file: &Path,
    output_dir: &Path,
    index: Option<usize>,
    formatter: &OutputFormatter,
) -> CliResult<()> {
    let tag = open(file)?.read_tag(&ReadOptions::default())?;
    let artwork = tag.artwork();
    if artwork.is_empty() {
        return Err(CliError::Other(format!("{} has no cover art", file.display())));
    }

    let selected: Vec<(usize, &Artwork)> = match index {
        Some(i) => {
            let picture = artwork.get(i).ok_or_else(|| {
                CliError::InvalidArgument(format!("cover index {} out of {}", i, artwork.len()))
            })?;
            vec![(i, *picture)]
        }
        None => artwork.iter().copied().enumerate().collect(),
    };

    fs::create_dir_all(output_dir)?;
    for (i, picture) in selected {
        if picture.is_linked() {
            formatter.print_info(&format!(
                "cover {} is a link to {}",
                i + 1,
                picture.linked_url().unwrap_or_default()
            ));
            continue;
        }
        let target = output_dir.join(cover_file_name(file, i, artwork.len(), picture));
        fs::write(&target, &picture.data)
            .with_context(|| format!("writing {}", target.display()))?;
        formatter.print_success(&format!("Exported {}", target.display()));
    }
    Ok(())
}

/// Legacy genre lookup by id or name
fn command_genre(query: Option<&str>, formatter: &OutputFormatter) -> CliResult<()> {
    let pairs: Vec<(String, String)> = match query {
        None => genres()
            .map(|(id, name)| (id.to_string(), name.to_string()))
            .collect(),
        Some(query) => match query.trim().parse::<u16>() {
            Ok(id) => {
                let name = genre_name(id)
                    .ok_or_else(|| CliError::InvalidArgument(format!("no genre with id {}", id)))?;
                vec![(id.to_string(), name.to_string())]
            }
            Err(_) => {
                let id = genre_id(query)
                    .ok_or_else(|| CliError::InvalidArgument(format!("unknown genre {:?}", query)))?;
                vec![(id.to_string(), genre_name(id).unwrap_or(query).to_string())]
            }
        },
    };
    formatter.output_pairs(&pairs, &mut io::stdout())
}

/// Read every file matching `pattern` under `directory`
fn command_batch(
    directory: &Path,
    pattern: &str,
    options: &ReadOptions,
    formatter: &OutputFormatter,
) -> CliResult<()> {
    let glob_pattern = directory.join(pattern);
    let glob_pattern = glob_pattern.to_string_lossy();

    let mut files = Vec::new();
    let entries = glob::glob(&glob_pattern)
        .map_err(|e| CliError::InvalidArgument(format!("invalid glob pattern: {}", e)))?;
    for entry in entries {
        match entry {
            Ok(path) if path.is_file() => files.push(path),
            Ok(_) => {}
            Err(e) => formatter.print_error(&format!("Error reading path: {}", e)),
        }
    }

    if files.is_empty() {
        formatter.print_info("No files found matching pattern");
        return Ok(());
    }
    formatter.print_info(&format!("Processing {} files...", files.len()));

    let mut success_count = 0;
    let mut error_count = 0;
    let mut stdout = io::stdout();
    for path in &files {
        match read_one(path, options) {
            Ok(tag) => {
                formatter.output_tag(&TagReport::new(path, &tag), &mut stdout)?;
                success_count += 1;
            }
            Err(e) => {
                formatter.print_error(&format!("{:#}", e));
                error_count += 1;
            }
        }
    }

    formatter.print_info(&format!(
        "Completed: {} successful, {} errors",
        success_count, error_count
    ));
    Ok(())
}

fn read_one(path: &Path, options: &ReadOptions) -> anyhow::Result<AnyTag> {
    let audio = AudioFile::open(path).with_context(|| format!("opening {}", path.display()))?;
    let tag = audio
        .read_tag(options)
        .with_context(|| format!("reading {}", path.display()))?;
    Ok(tag)
}

/// Show file information
fn command_info(files: &[PathBuf], formatter: &OutputFormatter) -> CliResult<()> {
    for path in files {
        let metadata = fs::metadata(path).map_err(|_| CliError::FileNotFound(path.display().to_string()))?;
        let mut pairs = vec![
            ("File".to_string(), path.display().to_string()),
            ("Size".to_string(), format!("{} bytes", metadata.len())),
        ];
        if let Ok(modified) = metadata.modified() {
            let modified: chrono::DateTime<chrono::Utc> = modified.into();
            pairs.push((
                "Modified".to_string(),
                modified.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
            ));
        }

        match AudioFile::open(path) {
            Ok(audio) => {
                pairs.push(("Format".to_string(), audio.file_type.to_string()));
                match audio.read_tag(&ReadOptions::default()) {
                    Ok(tag) => {
                        pairs.push(("Fields".to_string(), tag.len().to_string()));
                        pairs.push(("Covers".to_string(), tag.artwork().len().to_string()));
                    }
                    Err(e) => pairs.push(("Tag".to_string(), e.to_string())),
                }
            }
            Err(e) => pairs.push(("Format".to_string(), e.to_string())),
        }
        formatter.output_pairs(&pairs, &mut io::stdout())?;
    }
    Ok(())
}
