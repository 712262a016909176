use crate::domain::hls::{INIT_SEGMENT_NAME, MASTER_PLAYLIST_NAME, PLAYLIST_NAME, SEGMENT_PATTERN};
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command as TokioCommand;

/// Knobs for the segmenting transcoder.
#[derive(Clone, Debug)]
pub struct TranscoderSettings {
    pub program: String,
    /// Container of the bytes fed on stdin (what the synthesizer produces)
    pub input_format: String,
    pub audio_bitrate: String,
    /// Target segment duration in seconds; short keeps latency low
    pub segment_seconds: u64,
    /// Segments kept in the live playlist; older ones are deleted
    pub list_size: u32,
    pub init_seconds: f64,
    /// `EVENT`/`VOD`; `None` for a sliding window
    pub playlist_type: Option<String>,
    /// How long a fresh process must survive before `start` trusts it
    pub startup_grace: Duration,
    /// Grace period between terminate and kill on teardown
    pub shutdown_timeout: Duration,
    /// Upper bound on waiting for the process to drain after end of input
    pub finalize_timeout: Duration,
}

impl Default for TranscoderSettings {
    fn default() -> Self {
        Self {
            program: String::from("ffmpeg"),
            input_format: String::from("mp3"),
            audio_bitrate: String::from("128k"),
            segment_seconds: 2,
            list_size: 10,
            init_seconds: 0.5,
            playlist_type: None,
            startup_grace: Duration::from_millis(100),
            shutdown_timeout: Duration::from_secs(5),
            finalize_timeout: Duration::from_secs(120),
        }
    }
}

/// Builds the long-lived process that turns stdin audio into HLS output.
pub trait TranscodeCommand: Send + Sync {
    fn build(&self, output_dir: &Path, settings: &TranscoderSettings) -> TokioCommand;
}

pub struct FfmpegHlsCommand;

impl FfmpegHlsCommand {
    pub fn args(output_dir: &Path, settings: &TranscoderSettings) -> Vec<String> {
        let mut args: Vec<String> = vec![
            "-hide_banner".into(),
            "-nostats".into(),
            "-loglevel".into(),
            "info".into(),
            "-f".into(),
            settings.input_format.clone(),
            "-i".into(),
            "pipe:0".into(),
            "-c:a".into(),
            "aac".into(),
            "-b:a".into(),
            settings.audio_bitrate.clone(),
            "-f".into(),
            "hls".into(),
            "-hls_time".into(),
            settings.segment_seconds.to_string(),
            "-hls_list_size".into(),
            settings.list_size.to_string(),
            // temp_file: playlist and segments are renamed into place once complete
            "-hls_flags".into(),
            "delete_segments+append_list+independent_segments+program_date_time+temp_file".into(),
            "-hls_segment_type".into(),
            "fmp4".into(),
            "-hls_init_time".into(),
            settings.init_seconds.to_string(),
            "-hls_allow_cache".into(),
            "1".into(),
        ];
        if let Some(pt) = &settings.playlist_type {
            args.push("-hls_playlist_type".into());
            args.push(pt.to_lowercase());
        }
        args.extend([
            "-hls_fmp4_init_filename".to_string(),
            INIT_SEGMENT_NAME.to_string(),
            "-hls_segment_filename".to_string(),
            output_dir.join(SEGMENT_PATTERN).to_string_lossy().into_owned(),
            "-master_pl_name".to_string(),
            MASTER_PLAYLIST_NAME.to_string(),
            output_dir.join(PLAYLIST_NAME).to_string_lossy().into_owned(),
        ]);
        args
    }
}

impl TranscodeCommand for FfmpegHlsCommand {
    fn build(&self, output_dir: &Path, settings: &TranscoderSettings) -> TokioCommand {
        let mut command = TokioCommand::new(&settings.program);
        command
            .args(Self::args(output_dir, settings))
            .current_dir(output_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }
}
