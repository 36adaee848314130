//! Single-pass conversion engine
//!
//! Streams a finalized mbox file into `emails.csv` (and optionally
//! `attachments.csv`) inside a deflate-compressed ZIP container. One row is
//! written per message as it is read; neither the message set nor the output
//! is ever held fully in memory. Attachment rows are spilled to an anonymous
//! temp file during the pass and copied into the container as the second
//! entry, since a ZIP writer admits one entry at a time.

use anyhow::{anyhow, Context, Result};
use mail_parser::{Message, MessageParser, MimeHeaders};
use std::fs::File;
use std::io::{BufReader, Seek, SeekFrom, Write};
use std::path::Path;
use zip::{write::SimpleFileOptions, CompressionMethod, ZipWriter};

use super::headers::render_address_opt;
use super::mbox::{count_messages, MboxReader};
use crate::jobs::ExportOptions;

/// Body cells are trimmed to this many characters to bound memory and
/// output size.
pub const BODY_CHAR_LIMIT: usize = 32_000;

/// Inputs at most this large get a counting pre-scan for progress totals;
/// anything bigger reports an unknown total instead of paying a second pass.
pub const TOTAL_SCAN_LIMIT: u64 = 256 * 1024 * 1024;

/// Progress cadence when the total message count is unknown.
const PROGRESS_FALLBACK_INTERVAL: u64 = 50_000;

/// Result of a completed conversion
#[derive(Debug, Clone, Copy)]
pub struct ConversionOutcome {
    pub processed: u64,
}

/// Messages between progress reports: 1/200th of the total when known,
/// a fixed interval otherwise
pub fn progress_interval(total: u64) -> u64 {
    if total == 0 {
        PROGRESS_FALLBACK_INTERVAL
    } else {
        (total / 200).max(1)
    }
}

/// Best-effort total message count for progress reporting
///
/// Returns 0 (unknown) for large inputs and on any scan failure; an exact
/// total is a display nicety, never a correctness requirement.
pub fn count_total_if_cheap(input: &Path) -> u64 {
    let size = match std::fs::metadata(input) {
        Ok(meta) => meta.len(),
        Err(_) => return 0,
    };
    if size > TOTAL_SCAN_LIMIT {
        return 0;
    }
    match File::open(input).map(BufReader::new).map(count_messages) {
        Ok(Ok(count)) => count,
        _ => 0,
    }
}

/// Convert `input` into a ZIP of CSV tables at `output`
///
/// Runs synchronously; callers on the async side wrap it in a blocking task.
/// `progress` receives the running processed count at a bounded frequency.
/// On error the caller is responsible for removing the incomplete output.
pub fn convert(
    input: &Path,
    output: &Path,
    options: ExportOptions,
    total_hint: u64,
    progress: &mut dyn FnMut(u64),
) -> Result<ConversionOutcome> {
    let reader = BufReader::new(
        File::open(input).with_context(|| format!("Failed to open input {}", input.display()))?,
    );
    let out_file = File::create(output)
        .with_context(|| format!("Failed to create output {}", output.display()))?;

    let mut zip = ZipWriter::new(out_file);
    let entry_options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .large_file(true);

    // Spill for the secondary table; header row written up front so even a
    // zero-attachment export contains a valid table.
    let mut attachment_spill = if options.include_attachments {
        let spill = tempfile::tempfile().context("Failed to create attachment spill file")?;
        let mut writer = csv::Writer::from_writer(spill);
        writer
            .write_record(["message_id", "filename", "content_type", "size_bytes"])
            .context("Failed to write attachments header")?;
        Some(writer)
    } else {
        None
    };

    zip.start_file("emails.csv", entry_options)
        .context("Failed to start emails.csv entry")?;

    let parser = MessageParser::default();
    let interval = progress_interval(total_hint);
    let mut processed: u64 = 0;

    {
        let mut emails = csv::Writer::from_writer(&mut zip);

        let mut header = vec!["date", "from", "to", "cc", "bcc", "subject", "message_id"];
        if options.include_thread_id {
            header.push("thread_id");
        }
        if options.include_body {
            header.push("body");
        }
        emails
            .write_record(&header)
            .context("Failed to write emails header")?;

        for raw in MboxReader::new(reader) {
            let raw = raw.context("Failed to read message from archive")?;

            // Header-only parsing when neither body nor attachments are
            // requested; the full MIME tree otherwise.
            let message = if options.headers_only() {
                parser.parse_headers(&raw)
            } else {
                parser.parse(&raw)
            };

            match message {
                Some(message) => {
                    write_message_row(&mut emails, &message, &options)?;
                    if let Some(spill) = attachment_spill.as_mut() {
                        write_attachment_rows(spill, &message)?;
                    }
                },
                // Unparseable bytes still occupy one archive slot; keep the
                // row count equal to the message count.
                None => write_empty_row(&mut emails, &options)?,
            }

            processed += 1;
            if processed % interval == 0 {
                progress(processed);
            }
        }

        emails.flush().context("Failed to flush emails.csv")?;
    }

    if let Some(spill) = attachment_spill {
        let mut file = spill
            .into_inner()
            .map_err(|e| anyhow!("Failed to flush attachment spill: {}", e))?;
        file.flush()?;
        file.seek(SeekFrom::Start(0))?;

        zip.start_file("attachments.csv", entry_options)
            .context("Failed to start attachments.csv entry")?;
        std::io::copy(&mut file, &mut zip).context("Failed to write attachments.csv")?;
    }

    zip.finish().context("Failed to finalize archive")?;

    Ok(ConversionOutcome { processed })
}

fn write_message_row<W: Write>(
    writer: &mut csv::Writer<W>,
    message: &Message,
    options: &ExportOptions,
) -> Result<()> {
    let mut record: Vec<String> = vec![
        message.date().map(|d| d.to_rfc3339()).unwrap_or_default(),
        render_address_opt(message.from()),
        render_address_opt(message.to()),
        render_address_opt(message.cc()),
        render_address_opt(message.bcc()),
        message.subject().unwrap_or_default().to_string(),
        message.message_id().unwrap_or_default().to_string(),
    ];

    if options.include_thread_id {
        record.push(message.thread_name().unwrap_or_default().to_string());
    }
    if options.include_body {
        record.push(extract_body(message));
    }

    writer
        .write_record(&record)
        .context("Failed to write message row")?;
    Ok(())
}

fn write_empty_row<W: Write>(writer: &mut csv::Writer<W>, options: &ExportOptions) -> Result<()> {
    let mut columns = 7;
    if options.include_thread_id {
        columns += 1;
    }
    if options.include_body {
        columns += 1;
    }
    let record = vec![""; columns];
    writer
        .write_record(&record)
        .context("Failed to write message row")?;
    Ok(())
}

/// First plain-text non-attachment part, trimmed to [`BODY_CHAR_LIMIT`]
/// characters; empty when the message has no text part
fn extract_body(message: &Message) -> String {
    match message.body_text(0) {
        Some(text) => {
            if text.chars().count() > BODY_CHAR_LIMIT {
                text.chars().take(BODY_CHAR_LIMIT).collect()
            } else {
                text.into_owned()
            }
        },
        None => String::new(),
    }
}

fn write_attachment_rows<W: Write>(writer: &mut csv::Writer<W>, message: &Message) -> Result<()> {
    let message_id = message.message_id().unwrap_or_default().to_string();

    for (index, part) in message.attachments().enumerate() {
        let filename = part
            .attachment_name()
            .map(|n| n.to_string())
            .unwrap_or_else(|| format!("attachment-{}", index + 1));

        let content_type = part
            .content_type()
            .map(|ct| match ct.subtype() {
                Some(subtype) => format!("{}/{}", ct.ctype(), subtype),
                None => ct.ctype().to_string(),
            })
            .unwrap_or_else(|| "application/octet-stream".to_string());

        let size_bytes = part.contents().len();

        writer
            .write_record([
                message_id.as_str(),
                filename.as_str(),
                content_type.as_str(),
                size_bytes.to_string().as_str(),
            ])
            .context("Failed to write attachment row")?;
    }

    Ok(())
}
