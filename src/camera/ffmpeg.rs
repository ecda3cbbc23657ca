use std::io::{ErrorKind, Read};
use std::process::{Child, ChildStdout, Command, Stdio};

use image::RgbImage;

use crate::config::SourceConfig;

use super::{FrameSource, SourceError};

/// Decodes any ffmpeg-readable URL to raw `rgb24` frames over a pipe.
///
/// Live sources respawn ffmpeg on the next read after an interruption;
/// for files the end of the pipe is the end of the stream.
pub struct FfmpegSource {
    program: String,
    url: String,
    width: u32,
    height: u32,
    live: bool,
    child: Option<Child>,
    stdout: Option<ChildStdout>,
}

impl FfmpegSource {
    pub fn open(config: &SourceConfig) -> Result<Self, SourceError> {
        let mut source = Self {
            program: config.ffmpeg.clone(),
            url: config.url.clone(),
            width: config.width,
            height: config.height,
            live: config.is_live(),
            child: None,
            stdout: None,
        };
        source.spawn()?;
        Ok(source)
    }

    fn frame_size(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }

    fn args(&self) -> Vec<String> {
        let mut args: Vec<String> = ["-hide_banner", "-loglevel", "warning"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        if self.url.starts_with("rtsp://") || self.url.starts_with("rtsps://") {
            args.extend(["-rtsp_transport".to_string(), "tcp".to_string()]);
        }
        if !self.live {
            // pace files at their native rate so wall-clock speeds hold
            args.push("-re".to_string());
        }

        args.extend([
            "-i".to_string(),
            self.url.clone(),
            "-an".to_string(),
            "-vf".to_string(),
            format!("scale={}:{}", self.width, self.height),
            "-f".to_string(),
            "rawvideo".to_string(),
            "-pix_fmt".to_string(),
            "rgb24".to_string(),
            "pipe:1".to_string(),
        ]);
        args
    }

    fn spawn(&mut self) -> Result<(), SourceError> {
        let mut child = Command::new(&self.program)
            .args(self.args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| {
                if e.kind() == ErrorKind::NotFound {
                    SourceError::FfmpegNotFound
                } else {
                    SourceError::Io(e)
                }
            })?;

        let stdout = child.stdout.take().ok_or_else(|| {
            SourceError::FfmpegFailed("failed to capture stdout".to_string())
        })?;

        tracing::info!(
            url = %self.url,
            width = self.width,
            height = self.height,
            live = self.live,
            "ffmpeg source started"
        );

        self.child = Some(child);
        self.stdout = Some(stdout);
        Ok(())
    }

    fn stop(&mut self) {
        self.stdout.take();
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            match child.wait() {
                Ok(status) => tracing::debug!(status = %status, "ffmpeg exited"),
                Err(e) => tracing::debug!(error = %e, "failed to reap ffmpeg"),
            }
        }
    }
}

impl FrameSource for FfmpegSource {
    fn next_frame(&mut self) -> Result<Option<RgbImage>, SourceError> {
        if self.stdout.is_none() {
            if !self.live {
                return Ok(None);
            }
            self.spawn()?;
        }

        let mut buf = vec![0u8; self.frame_size()];
        let read = match self.stdout.as_mut() {
            Some(stdout) => stdout.read_exact(&mut buf),
            None => return Err(SourceError::Interrupted),
        };

        match read {
            Ok(()) => {
                let expected = buf.len();
                RgbImage::from_raw(self.width, self.height, buf)
                    .map(Some)
                    .ok_or(SourceError::BadFrame { expected })
            }
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                self.stop();
                if self.live {
                    Err(SourceError::Interrupted)
                } else {
                    Ok(None)
                }
            }
            Err(e) => {
                self.stop();
                Err(SourceError::Io(e))
            }
        }
    }
}

impl Drop for FfmpegSource {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn source_config(url: &str, ffmpeg: &str) -> SourceConfig {
        let mut config = Config::parse(&format!("[source]\nurl = \"{url}\"\n"))
            .unwrap()
            .source;
        config.ffmpeg = ffmpeg.to_string();
        config
    }

    #[test]
    fn test_missing_binary_is_reported() {
        let config = source_config("rtsp://cam/stream", "/nonexistent/ffmpeg");
        assert!(matches!(
            FfmpegSource::open(&config),
            Err(SourceError::FfmpegNotFound)
        ));
    }

    #[test]
    fn test_non_ffmpeg_output_ends_file_stream() {
        // `true` exits immediately with an empty stdout
        let config = source_config("/videos/line.mp4", "true");
        let mut source = FfmpegSource::open(&config).unwrap();
        assert!(source.next_frame().unwrap().is_none());
        assert!(source.next_frame().unwrap().is_none());
    }

    #[test]
    fn test_live_stream_interruption_is_transient() {
        let config = source_config("rtsp://cam/stream", "true");
        let mut source = FfmpegSource::open(&config).unwrap();
        assert!(matches!(source.next_frame(), Err(SourceError::Interrupted)));
        // respawns on the next read
        assert!(matches!(source.next_frame(), Err(SourceError::Interrupted)));
    }

    #[test]
    fn test_rtsp_uses_tcp_and_files_are_paced() {
        let live = FfmpegSource {
            program: "ffmpeg".to_string(),
            url: "rtsp://cam/stream".to_string(),
            width: 640,
            height: 360,
            live: true,
            child: None,
            stdout: None,
        };
        let args = live.args();
        assert!(args
            .windows(2)
            .any(|w| w[0] == "-rtsp_transport" && w[1] == "tcp"));
        assert!(!args.contains(&"-re".to_string()));
        assert!(args.contains(&"scale=640:360".to_string()));

        let file = FfmpegSource {
            program: "ffmpeg".to_string(),
            url: "line.mp4".to_string(),
            width: 640,
            height: 360,
            live: false,
            child: None,
            stdout: None,
        };
        assert!(file.args().contains(&"-re".to_string()));
    }
}
