//! Downloader argument assembly.

use std::ffi::OsString;
use std::path::Path;

use crate::store::Task;

/// Arguments for one downloader invocation, in order:
/// `--ffmpeg-location <encoder>` (when set), `-f <video>+<audio>`,
/// `-o <output>`, the free-form parameter as a single argument (when
/// non-empty), and the source URL last.
pub fn build_args(task: &Task, encoder: Option<&Path>) -> Vec<OsString> {
    let mut args: Vec<OsString> = Vec::with_capacity(8);
    if let Some(encoder) = encoder {
        args.push("--ffmpeg-location".into());
        args.push(encoder.as_os_str().to_owned());
    }
    args.push("-f".into());
    args.push(task.format_selector().into());
    args.push("-o".into());
    args.push(task.output_path.clone().into());
    if !task.parameter.is_empty() {
        args.push(task.parameter.clone().into());
    }
    args.push(task.url.clone().into());
    args
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(parameter: &str) -> Task {
        Task {
            id: "abc".into(),
            video_format: "135".into(),
            audio_format: "140".into(),
            url: "https://x/watch?v=abc".into(),
            output_path: "/tmp/%(title)s.%(ext)s".into(),
            parameter: parameter.into(),
            ..Task::default()
        }
    }

    #[test]
    fn full_argument_list() {
        let args = build_args(&task("--no-part"), Some(Path::new("/usr/bin/ffmpeg")));
        assert_eq!(
            args,
            vec![
                "--ffmpeg-location",
                "/usr/bin/ffmpeg",
                "-f",
                "135+140",
                "-o",
                "/tmp/%(title)s.%(ext)s",
                "--no-part",
                "https://x/watch?v=abc",
            ]
        );
    }

    #[test]
    fn optional_parts_are_omitted() {
        let args = build_args(&task(""), None);
        assert_eq!(
            args,
            vec!["-f", "135+140", "-o", "/tmp/%(title)s.%(ext)s", "https://x/watch?v=abc"]
        );
    }

    #[test]
    fn parameter_is_passed_verbatim_as_one_argument() {
        let args = build_args(&task("--limit-rate 1M"), None);
        assert_eq!(args[4], "--limit-rate 1M");
        assert_eq!(args.last().unwrap(), "https://x/watch?v=abc");
    }
}
