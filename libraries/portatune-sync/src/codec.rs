//! External codec invocation
//!
//! Decoding and encoding shell out to the stock command line tools. Command
//! lines are built by pure functions so the exact invocations stay testable
//! without the binaries installed.

use crate::error::{Result, SyncError};
use portatune_core::{CodecTools, TargetCodec, AAC_QUALITY, OPUS_BITRATE_KBPS};
use std::path::Path;
use tokio::process::Command;

/// Build the decode command for a source file, or `None` when the source is
/// already WAV and can feed the encoder directly.
fn decode_command(
    tools: &CodecTools,
    extension: &str,
    source: &Path,
    wav: &Path,
) -> Result<Option<(String, Vec<String>)>> {
    match extension {
        "mp3" => Ok(Some((
            tools.mpg123.clone(),
            vec![
                "--quiet".to_string(),
                "-w".to_string(),
                wav.display().to_string(),
                source.display().to_string(),
            ],
        ))),
        "flac" => Ok(Some((
            tools.flac.clone(),
            vec![
                "-d".to_string(),
                "-f".to_string(),
                "-s".to_string(),
                "-o".to_string(),
                wav.display().to_string(),
                source.display().to_string(),
            ],
        ))),
        "wav" => Ok(None),
        other => Err(SyncError::Codec(format!(
            "no decoder for .{other} files: {}",
            source.display()
        ))),
    }
}

/// Build the encode command from a WAV input to a staged output file.
fn encode_command(
    tools: &CodecTools,
    codec: TargetCodec,
    wav: &Path,
    staged: &Path,
) -> (String, Vec<String>) {
    match codec {
        TargetCodec::Opus => (
            tools.opusenc.clone(),
            vec![
                "--bitrate".to_string(),
                OPUS_BITRATE_KBPS.to_string(),
                wav.display().to_string(),
                staged.display().to_string(),
            ],
        ),
        TargetCodec::Aac => (
            tools.aac_encoder.clone(),
            vec![
                "-q".to_string(),
                AAC_QUALITY.to_string(),
                "-if".to_string(),
                wav.display().to_string(),
                "-of".to_string(),
                staged.display().to_string(),
            ],
        ),
    }
}

/// Decode `source` into `wav`.
///
/// Returns the path the encoder should read: `wav`, or `source` itself when
/// no decode step is needed. mpg123 runs quiet, so with it any output at all
/// means a broken source file even when the exit status says otherwise.
pub(crate) async fn decode_to_wav<'a>(
    tools: &CodecTools,
    extension: &str,
    source: &'a Path,
    wav: &'a Path,
) -> Result<&'a Path> {
    let Some((program, args)) = decode_command(tools, extension, source, wav)? else {
        return Ok(source);
    };
    let output = Command::new(&program).args(&args).output().await?;

    let noise = !output.stdout.is_empty() || !output.stderr.is_empty();
    if !output.status.success() || (extension == "mp3" && noise) {
        return Err(SyncError::Codec(format!(
            "{program} failed on {}: {}{}",
            source.display(),
            String::from_utf8_lossy(&output.stderr).trim(),
            String::from_utf8_lossy(&output.stdout).trim(),
        )));
    }
    Ok(wav)
}

/// Encode a WAV file into the staged destination.
pub(crate) async fn encode_from_wav(
    tools: &CodecTools,
    codec: TargetCodec,
    wav: &Path,
    staged: &Path,
) -> Result<()> {
    let (program, args) = encode_command(tools, codec, wav, staged);
    let output = Command::new(&program).args(&args).output().await?;
    if !output.status.success() {
        return Err(SyncError::Codec(format!(
            "{program} failed on {}: {}",
            wav.display(),
            String::from_utf8_lossy(&output.stderr).trim(),
        )));
    }
    Ok(())
}
