mod console;

use anyhow::{anyhow, Context, Result};
use clap::{Args as ClapArgs, Subcommand};
use console::{log_notice, AppEvent, Console};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedSender};
use tracing::{error, info, warn};
use tubegrab::config::{AppConfig, ConfigStore, Settings};
use tubegrab::media::{
    itag_of, select_formats, ConnectivityProbe, ContainerPolicy, DownloadRequest,
    FormatSelector, MediaDownloader, NoticeLevel, Notification, Selection, Transcoder,
    YtDlpEngine,
};
use tubegrab::utils::format_views;
use tubegrab::Error;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Show video details and the formats that can be downloaded
    Info {
        url: String,
        #[command(flatten)]
        mode: ModeArgs,
    },
    /// Download one or more videos
    Download {
        #[arg(required = true)]
        urls: Vec<String>,
        /// Format to fetch: an itag, a line printed by `info`, or `best`
        #[arg(short, long)]
        format: Option<String>,
        /// Destination folder, remembered for next time
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[command(flatten)]
        mode: ModeArgs,
    },
    /// Check that yt-dlp and ffmpeg are usable
    Check,
    /// Show or change saved preferences
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(ClapArgs, Debug)]
pub struct ModeArgs {
    /// Audio only; remembered as the default
    #[arg(long, conflicts_with = "video")]
    audio: bool,
    /// Video with audio; remembered as the default
    #[arg(long)]
    video: bool,
    /// Only offer video formats in this container (e.g. mp4)
    #[arg(long)]
    container: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the saved preferences
    Show,
    /// Change one preference, e.g. `set preferredQuality 720p`
    Set { key: String, value: String },
    /// Print the preferences file location
    Path,
}

struct Session {
    settings: Settings,
    store: ConfigStore,
    config: AppConfig,
}

impl Session {
    fn update(&mut self, change: impl FnOnce(&mut AppConfig)) {
        let before = self.config.clone();
        change(&mut self.config);
        if self.config != before {
            self.store.save(&self.config);
        }
    }

    fn audio_only(&mut self, mode: &ModeArgs) -> bool {
        if mode.audio || mode.video {
            let audio_only = mode.audio;
            self.update(|config| config.audio_only_default = audio_only);
        }
        self.config.audio_only_default
    }

    fn container_policy(&self, mode: &ModeArgs) -> ContainerPolicy {
        ContainerPolicy::from_option(
            mode.container
                .clone()
                .or_else(|| self.settings.downloads.video_container.clone()),
        )
    }

    fn downloader(&self) -> MediaDownloader {
        let settings = &self.settings;

        let transcoder = match Transcoder::discover(settings.tools.ffmpeg.as_deref()) {
            Ok(transcoder) => {
                info!("✅ ffmpeg found at: {}", transcoder.path().display());
                Some(transcoder)
            }
            Err(e) => {
                warn!("⚠️ {}. Install ffmpeg for audio conversion and merging.", e);
                None
            }
        };

        let probe = settings.network.connectivity_check.then(|| {
            ConnectivityProbe::new(
                settings.network.probe_url.clone(),
                Duration::from_secs(settings.network.probe_timeout_secs),
            )
        });

        let engine = YtDlpEngine::new(
            settings.tools.ytdlp.clone(),
            transcoder.as_ref().map(|t| t.path().to_path_buf()),
            &settings.downloads.merge_format,
        );

        MediaDownloader::new(Box::new(engine))
            .with_transcoder(transcoder)
            .with_probe(probe)
            .with_max_concurrent(settings.downloads.max_concurrent)
            .with_audio_output(
                &settings.downloads.audio_format,
                &settings.downloads.audio_quality,
            )
    }
}

pub async fn run(command: Command, settings: Settings, store: ConfigStore) -> Result<()> {
    let prefs = store.load();
    if !prefs.last_folder.is_empty() {
        info!("📁 Default folder: {}", prefs.last_folder);
    }

    let mut session = Session {
        settings,
        store,
        config: prefs,
    };

    match command {
        Command::Info { url, mode } => info(&mut session, &url, &mode).await,
        Command::Download {
            urls,
            format,
            output,
            mode,
        } => download(&mut session, urls, format, output, &mode).await,
        Command::Check => {
            session.downloader().test_setup().await.map_err(|e| report(&e))?;
            info!(status = "success", "✅ Ready to download");
            Ok(())
        }
        Command::Config { action } => config_command(&mut session, action),
    }
}

async fn info(session: &mut Session, url: &str, mode: &ModeArgs) -> Result<()> {
    let audio_only = session.audio_only(mode);
    let policy = session.container_policy(mode);
    let downloader = session.downloader();

    info!("🔍 Fetching video information...");
    let manifest = downloader
        .fetch_catalog(url)
        .await
        .map_err(|e| report(&e))?;
    info!(status = "success", "📹 Video found: {}", manifest.title);

    let selection =
        select_formats(&manifest.formats, audio_only, &policy).map_err(|e| report(&e))?;

    println!("Title:    {}", manifest.title);
    println!(
        "Duration: {}",
        manifest.duration.as_deref().unwrap_or("Unknown")
    );
    println!(
        "Author:   {}",
        manifest.uploader.as_deref().unwrap_or("Unknown")
    );
    println!("Views:    {}", format_views(manifest.view_count));
    println!();

    let best = selection.best_video.as_ref().map(|b| b.id.as_str());
    for choice in &selection.choices {
        let marker = if Some(choice.itag()) == best { "*" } else { " " };
        println!("{marker} {choice}");
    }

    info!(
        status = "success",
        "✅ {} formats available",
        selection.choices.len()
    );
    Ok(())
}

struct Plan {
    format: Option<String>,
    audio_only: bool,
    output_dir: PathBuf,
    policy: ContainerPolicy,
    preferred_quality: String,
}

async fn download(
    session: &mut Session,
    urls: Vec<String>,
    format: Option<String>,
    output: Option<PathBuf>,
    mode: &ModeArgs,
) -> Result<()> {
    let audio_only = session.audio_only(mode);

    if let Some(dir) = &output {
        if dir.is_dir() {
            let folder = dir.to_string_lossy().into_owned();
            session.update(|config| config.last_folder = folder);
        }
    }

    let output_dir = match output {
        Some(dir) => dir,
        None if !session.config.last_folder.is_empty() => {
            PathBuf::from(&session.config.last_folder)
        }
        None => std::env::current_dir().context("Failed to resolve the current directory")?,
    };

    let plan = Arc::new(Plan {
        format,
        audio_only,
        output_dir,
        policy: session.container_policy(mode),
        preferred_quality: session.config.preferred_quality.clone(),
    });
    let downloader = Arc::new(session.downloader());

    let (events, mut inbox) = mpsc::unbounded_channel();
    let total = urls.len();
    for (job, url) in urls.into_iter().enumerate() {
        tokio::spawn(run_job(
            job,
            url,
            Arc::clone(&plan),
            Arc::clone(&downloader),
            events.clone(),
        ));
    }
    drop(events);

    let mut console = Console::new();
    while let Some(event) = inbox.recv().await {
        console.handle(event);
    }

    info!(
        "Finished: {} succeeded, {} failed",
        console.succeeded(),
        console.failed()
    );

    if console.failed() > 0 {
        return Err(anyhow!("{} of {} downloads failed", console.failed(), total));
    }
    Ok(())
}

async fn run_job(
    job: usize,
    url: String,
    plan: Arc<Plan>,
    downloader: Arc<MediaDownloader>,
    events: UnboundedSender<AppEvent>,
) {
    let result = transfer(job, url.trim(), &plan, &downloader, &events)
        .await
        .map_err(|e| report(&e).to_string());

    let _ = events.send(AppEvent::Finished { job, result });
}

async fn transfer(
    job: usize,
    url: &str,
    plan: &Plan,
    downloader: &MediaDownloader,
    events: &UnboundedSender<AppEvent>,
) -> tubegrab::Result<tubegrab::media::DownloadOutcome> {
    let (format, title) = resolve_format(downloader, url, plan).await?;

    if plan.audio_only && !downloader.can_transcode() {
        let _ = events.send(AppEvent::Notice(
            job,
            Notification::new(
                NoticeLevel::Warning,
                "ffmpeg not found, audio will be kept in its original format".to_string(),
            ),
        ));
    }

    let request = DownloadRequest {
        url: url.to_string(),
        output_dir: plan.output_dir.clone(),
        format,
        audio_only: plan.audio_only,
    };

    let _ = events.send(AppEvent::Started {
        job,
        url: url.to_string(),
        title,
        format: request.format_spec(),
    });

    let (progress_tx, mut progress_rx) = mpsc::unbounded_channel();
    let forward = async {
        while let Some(event) = progress_rx.recv().await {
            let _ = events.send(AppEvent::Progress(job, event));
        }
    };

    let (result, ()) = tokio::join!(downloader.download(&request, progress_tx), forward);
    result
}

async fn resolve_format(
    downloader: &MediaDownloader,
    url: &str,
    plan: &Plan,
) -> tubegrab::Result<(FormatSelector, Option<String>)> {
    if let Some(choice) = &plan.format {
        return Ok((explicit_format(choice), None));
    }

    let manifest = downloader.fetch_catalog(url).await?;
    let selection = select_formats(&manifest.formats, plan.audio_only, &plan.policy)?;

    Ok((pick_format(&selection, plan), Some(manifest.title.clone())))
}

/// Accepts `best`, a bare itag or a full line printed by `info`.
fn explicit_format(choice: &str) -> FormatSelector {
    match itag_of(choice) {
        Some("best") | None => FormatSelector::Best,
        Some(itag) => FormatSelector::Itag(itag.to_string()),
    }
}

/// First choice matching the preferred quality, else the best video stream
/// in video mode, else the first choice.
fn pick_format(selection: &Selection, plan: &Plan) -> FormatSelector {
    let preferred = selection
        .preferred(&plan.preferred_quality)
        .map(|choice| choice.itag().to_string());

    let best_video = || {
        if plan.audio_only {
            None
        } else {
            selection.best_video.as_ref().map(|best| best.id.clone())
        }
    };

    preferred
        .or_else(best_video)
        .or_else(|| selection.choices.first().map(|c| c.itag().to_string()))
        .map_or(FormatSelector::Best, FormatSelector::Itag)
}

fn config_command(session: &mut Session, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let json = serde_json::to_string_pretty(&session.config)
                .context("Failed to render preferences")?;
            println!("{json}");
        }
        ConfigAction::Set { key, value } => {
            let mut updated = session.config.clone();
            updated.set(&key, &value).map_err(|e| anyhow!(e))?;
            session.update(|config| *config = updated);
            log_notice(
                0,
                &Notification::new(NoticeLevel::Success, format!("Saved {key} = {value}")),
            );
        }
        ConfigAction::Path => println!("{}", session.store.path().display()),
    }
    Ok(())
}

/// Logs an operation failure with full detail and hands it back for the
/// user-facing summary.
fn report(e: &Error) -> anyhow::Error {
    if e.is_validation() {
        warn!("⚠️ {}", e);
    } else {
        error!("❌ {}", e);
    }
    anyhow!(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tubegrab::media::{MediaKind, StreamDescriptor};

    fn stream(id: &str, kind: MediaKind, height: Option<u32>) -> StreamDescriptor {
        StreamDescriptor {
            id: id.to_string(),
            kind,
            container: "mp4".to_string(),
            height,
            frame_rate: None,
            audio_bitrate_kbps: Some(128.0),
            approx_size_bytes: None,
        }
    }

    fn catalog() -> Vec<StreamDescriptor> {
        vec![
            stream("137", MediaKind::Video, Some(1080)),
            stream("22", MediaKind::Both, Some(720)),
            stream("160", MediaKind::Video, Some(144)),
            stream("140", MediaKind::Audio, None),
            stream("251", MediaKind::Audio, None),
        ]
    }

    fn plan(audio_only: bool, preferred_quality: &str) -> Plan {
        Plan {
            format: None,
            audio_only,
            output_dir: PathBuf::from("."),
            policy: ContainerPolicy::Any,
            preferred_quality: preferred_quality.to_string(),
        }
    }

    fn pick(audio_only: bool, preferred_quality: &str) -> FormatSelector {
        let plan = plan(audio_only, preferred_quality);
        let selection = select_formats(&catalog(), audio_only, &plan.policy).unwrap();
        pick_format(&selection, &plan)
    }

    #[test]
    fn test_preferred_quality_wins() {
        assert_eq!(pick(false, "720p"), FormatSelector::Itag("22".to_string()));
        assert_eq!(pick(false, "144p"), FormatSelector::Itag("160".to_string()));
    }

    #[test]
    fn test_video_mode_falls_back_to_tallest_stream() {
        // "Video 720p" sorts first, but the tallest stream is picked.
        assert_eq!(pick(false, ""), FormatSelector::Itag("137".to_string()));
        assert_eq!(pick(false, "4320p"), FormatSelector::Itag("137".to_string()));
    }

    #[test]
    fn test_audio_mode_falls_back_to_first_choice() {
        // Audio labels end in descending itag order: 251 before 140.
        assert_eq!(pick(true, ""), FormatSelector::Itag("251".to_string()));
        assert_eq!(pick(true, "720p"), FormatSelector::Itag("251".to_string()));
    }

    #[test]
    fn test_audio_mode_honours_audio_preference() {
        assert_eq!(pick(true, "itag:140"), FormatSelector::Itag("140".to_string()));
    }

    #[test]
    fn test_explicit_format() {
        assert_eq!(explicit_format("best"), FormatSelector::Best);
        assert_eq!(explicit_format("  "), FormatSelector::Best);
        assert_eq!(explicit_format("251"), FormatSelector::Itag("251".to_string()));
        assert_eq!(
            explicit_format("Video 720p ?fps - mp4 (?MB) - itag:22"),
            FormatSelector::Itag("22".to_string())
        );
    }

    #[tokio::test]
    async fn test_config_command_saves_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let set = Command::Config {
            action: ConfigAction::Set {
                key: "preferredQuality".to_string(),
                value: "720p".to_string(),
            },
        };
        run(set, Settings::default(), ConfigStore::new(&path))
            .await
            .unwrap();

        assert_eq!(ConfigStore::new(&path).load().preferred_quality, "720p");

        let show = Command::Config {
            action: ConfigAction::Show,
        };
        assert!(run(show, Settings::default(), ConfigStore::new(&path))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_config_command_rejects_unknown_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let set = Command::Config {
            action: ConfigAction::Set {
                key: "theme".to_string(),
                value: "dark".to_string(),
            },
        };

        assert!(run(set, Settings::default(), ConfigStore::new(&path))
            .await
            .is_err());
        assert!(!path.exists());
    }
}
