//! Tests for add and run subcommands.

use super::parse;
use crate::cli::{Cli, CliCommand};
use clap::Parser;

#[test]
fn cli_parse_add_defaults() {
    match parse(&["ytdlq", "add", "https://www.youtube.com/watch?v=abc"]) {
        CliCommand::Add {
            url,
            id,
            video_format,
            audio_format,
            title,
            output,
            parameter,
        } => {
            assert_eq!(url, "https://www.youtube.com/watch?v=abc");
            assert!(id.is_none());
            assert_eq!(video_format, "bestvideo");
            assert_eq!(audio_format, "bestaudio");
            assert_eq!(title, "");
            assert_eq!(output, "%(title)s.%(ext)s");
            assert_eq!(parameter, "");
        }
        _ => panic!("expected Add"),
    }
}

#[test]
fn cli_parse_add_all_options() {
    match parse(&[
        "ytdlq",
        "add",
        "https://x/watch?v=abc",
        "--id",
        "custom",
        "-v",
        "135",
        "-a",
        "140",
        "--title",
        "My video",
        "-o",
        "/srv/media/abc.mp4",
        "--parameter",
        "--no-part",
    ]) {
        CliCommand::Add {
            id,
            video_format,
            audio_format,
            title,
            output,
            parameter,
            ..
        } => {
            assert_eq!(id.as_deref(), Some("custom"));
            assert_eq!(video_format, "135");
            assert_eq!(audio_format, "140");
            assert_eq!(title, "My video");
            assert_eq!(output, "/srv/media/abc.mp4");
            assert_eq!(parameter, "--no-part");
        }
        _ => panic!("expected Add with options"),
    }
}

#[test]
fn cli_parse_add_requires_url() {
    assert!(Cli::try_parse_from(["ytdlq", "add"]).is_err());
}

#[test]
fn cli_parse_run_defaults() {
    match parse(&["ytdlq", "run"]) {
        CliCommand::Run {
            workers,
            downloader,
            encoder,
            lock,
        } => {
            assert!(workers.is_none());
            assert!(downloader.is_none());
            assert!(encoder.is_none());
            assert!(lock.is_none());
        }
        _ => panic!("expected Run"),
    }
}

#[test]
fn cli_parse_run_overrides() {
    match parse(&[
        "ytdlq",
        "run",
        "--workers",
        "3",
        "--downloader",
        "/usr/local/bin/yt-dlp",
        "--encoder",
        "/opt/ffmpeg/bin/ffmpeg",
        "--lock",
        "/run/ytdlq.pid",
    ]) {
        CliCommand::Run {
            workers,
            downloader,
            encoder,
            lock,
        } => {
            assert_eq!(workers, Some(3));
            assert_eq!(
                downloader.as_deref(),
                Some(std::path::Path::new("/usr/local/bin/yt-dlp"))
            );
            assert_eq!(
                encoder.as_deref(),
                Some(std::path::Path::new("/opt/ffmpeg/bin/ffmpeg"))
            );
            assert_eq!(lock.as_deref(), Some(std::path::Path::new("/run/ytdlq.pid")));
        }
        _ => panic!("expected Run with overrides"),
    }
}

#[test]
fn cli_parse_run_rejects_non_numeric_workers() {
    assert!(Cli::try_parse_from(["ytdlq", "run", "--workers", "many"]).is_err());
}
