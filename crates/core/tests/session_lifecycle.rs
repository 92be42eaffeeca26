//! Download session lifecycle integration tests.
//!
//! These tests drive the engine end to end with a scripted launcher:
//! allocate -> launch -> relay output -> classify -> deliver -> clean up

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use audiograb_core::{
    testing::{fixtures, MockLauncher, ScriptStep, ScriptedProcess},
    Config, DownloadEngine, Privilege, SessionEvent, SessionHandle, ToolVariant,
};

/// Test helper holding the engine and its storage roots.
struct TestHarness {
    engine: DownloadEngine,
    launcher: Arc<MockLauncher>,
    base_dir: PathBuf,
    admin_dir: PathBuf,
    _temp_dir: TempDir,
}

impl TestHarness {
    fn new(launcher: MockLauncher) -> Self {
        Self::with_config(launcher, |_| {})
    }

    fn with_config(launcher: MockLauncher, customize: impl FnOnce(&mut Config)) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let base_dir = temp_dir.path().join("downloads");
        let admin_dir = temp_dir.path().join("library");

        let mut config = Config::default();
        config.storage.base_dir = base_dir.clone();
        config.storage.admin_dir = Some(admin_dir.clone());
        customize(&mut config);

        let launcher = Arc::new(launcher);
        let engine = DownloadEngine::new(&config, launcher.clone());

        Self {
            engine,
            launcher,
            base_dir,
            admin_dir,
            _temp_dir: temp_dir,
        }
    }

    async fn run(&self, link: &str, privilege: Privilege) -> (SessionHandle, Vec<SessionEvent>) {
        let mut handle = self
            .engine
            .begin(link, privilege)
            .await
            .expect("Failed to begin session");
        let mut events = Vec::new();
        while let Some(event) = handle.events.recv().await {
            events.push(event);
        }
        (handle, events)
    }
}

/// Launcher that writes `files` into the destination and prints `lines`.
fn writing_launcher(files: &'static [&'static str], lines: &'static [&'static str]) -> MockLauncher {
    MockLauncher::new(move |command| {
        let dest = fixtures::destination_of(command);
        for file in files {
            fixtures::write_file(&dest.join(file));
        }
        Ok(ScriptedProcess::new(
            lines.iter().map(|line| ScriptStep::line(*line)).collect(),
        ))
    })
}

fn terminal_events(events: &[SessionEvent]) -> Vec<&SessionEvent> {
    events.iter().filter(|e| e.is_terminal()).collect()
}

fn zip_entries(path: &Path) -> Vec<String> {
    let file = std::fs::File::open(path).expect("archive missing");
    let mut archive = zip::ZipArchive::new(file).expect("not a zip");
    let mut names: Vec<String> = (0..archive.len())
        .map(|i| archive.by_index(i).unwrap().name().to_string())
        .collect();
    names.sort();
    names
}

async fn wait_until_gone(path: &Path) -> bool {
    for _ in 0..100 {
        if !path.exists() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

#[tokio::test]
async fn test_spotify_link_runs_spotdl_with_output_template() {
    let harness = TestHarness::new(MockLauncher::silent());

    let (handle, _) = harness
        .run("https://open.spotify.com/album/4m2880jivSbbyEGAKfITCa", Privilege::Anonymous)
        .await;

    let launches = harness.launcher.recorded_launches();
    assert_eq!(launches.len(), 1);
    let command = &launches[0];
    let dest = harness.base_dir.join(handle.session_id.to_string());
    assert_eq!(command.program, PathBuf::from("spotdl"));
    assert_eq!(
        command.args,
        vec![
            "--output".to_string(),
            format!(
                "{}/{{artist}}/{{album}}/{{track-number}} - {{title}}.{{output-ext}}",
                dest.display()
            ),
            "https://open.spotify.com/album/4m2880jivSbbyEGAKfITCa".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_other_link_runs_ytdlp_with_output_template() {
    let harness = TestHarness::new(MockLauncher::silent());

    let (handle, _) = harness
        .run("https://www.youtube.com/watch?v=dQw4w9WgXcQ", Privilege::Anonymous)
        .await;

    let command = &harness.launcher.recorded_launches()[0];
    let dest = harness.base_dir.join(handle.session_id.to_string());
    assert_eq!(command.program, PathBuf::from("yt-dlp"));
    assert_eq!(
        command.args,
        vec![
            "-x".to_string(),
            "--newline".to_string(),
            "--audio-format".to_string(),
            "mp3".to_string(),
            "-o".to_string(),
            format!(
                "{}/%(uploader|artist)s/%(album|playlist)s/%(playlist_index)s - %(title)s.%(ext)s",
                dest.display()
            ),
            "https://www.youtube.com/watch?v=dQw4w9WgXcQ".to_string(),
        ]
    );
    assert_eq!(
        ToolVariant::for_link("https://www.youtube.com/watch?v=dQw4w9WgXcQ"),
        ToolVariant::YtDlp
    );
}

#[tokio::test]
async fn test_multi_file_session_delivers_album_archive() {
    let harness = TestHarness::new(writing_launcher(
        &[
            "Daft Punk/Discovery/01 - One More Time.mp3",
            "Daft Punk/Discovery/02 - Aerodynamic.mp3",
            "Daft Punk/Discovery/cover.jpg",
        ],
        &[
            "Processing query: https://open.spotify.com/album/x",
            "Found 2 songs in Discovery (Album)",
            "Downloaded \"One More Time\"",
            "Downloaded \"Aerodynamic\"",
        ],
    ));

    let (handle, events) = harness
        .run("https://open.spotify.com/album/x", Privilege::Anonymous)
        .await;

    assert_eq!(events.len(), 5);
    assert_eq!(
        events[1],
        SessionEvent::Progress("Found 2 songs in Discovery (Album)".to_string())
    );
    assert_eq!(
        events[4],
        SessionEvent::Delivery(format!("{}/Discovery.zip", handle.session_id))
    );
    assert_eq!(
        events[4].message(),
        format!("DOWNLOAD: {}/Discovery.zip", handle.session_id)
    );

    let archive = harness
        .base_dir
        .join(handle.session_id.to_string())
        .join("Discovery.zip");
    assert_eq!(
        zip_entries(&archive),
        vec![
            "Daft Punk/Discovery/01 - One More Time.mp3",
            "Daft Punk/Discovery/02 - Aerodynamic.mp3",
        ]
    );

    let mut contents = String::new();
    zip::ZipArchive::new(std::fs::File::open(&archive).unwrap())
        .unwrap()
        .by_name("Daft Punk/Discovery/02 - Aerodynamic.mp3")
        .unwrap()
        .read_to_string(&mut contents)
        .unwrap();
    assert_eq!(contents, "not really audio");
}

#[tokio::test]
async fn test_last_album_match_names_archive() {
    let harness = TestHarness::new(writing_launcher(
        &["a/1.mp3", "a/2.mp3"],
        &[
            "[youtube:tab] Downloading playlist \"First\" - add --no-playlist",
            "[youtube:tab] Downloading playlist \"Second\" - add --no-playlist",
        ],
    ));

    let (handle, events) = harness
        .run("https://www.youtube.com/playlist?list=PL1", Privilege::Anonymous)
        .await;

    assert_eq!(
        events.last(),
        Some(&SessionEvent::Delivery(format!("{}/Second.zip", handle.session_id)))
    );
}

#[tokio::test]
async fn test_archive_defaults_to_playlist_name() {
    let harness = TestHarness::new(writing_launcher(&["a/1.mp3", "a/2.ogg"], &[]));

    let (handle, events) = harness
        .run("https://soundcloud.com/someone/sets/x", Privilege::Anonymous)
        .await;

    assert_eq!(
        events,
        vec![SessionEvent::Delivery(format!("{}/playlist.zip", handle.session_id))]
    );
    assert!(harness
        .base_dir
        .join(handle.session_id.to_string())
        .join("playlist.zip")
        .is_file());
}

#[tokio::test]
async fn test_single_file_delivery_path_unescapes_to_relative_path() {
    let harness = TestHarness::new(writing_launcher(&["AC DC/Back in Black/01 - Hells Bells #1.flac"], &[]));

    let (handle, events) = harness
        .run("https://open.spotify.com/track/y", Privilege::Anonymous)
        .await;

    let terminal = terminal_events(&events);
    assert_eq!(terminal.len(), 1);
    let SessionEvent::Delivery(path) = terminal[0] else {
        panic!("expected delivery, got {:?}", terminal[0]);
    };
    let prefix = format!("{}/", handle.session_id);
    let relative = path.strip_prefix(&prefix).expect("delivery not addressed by session");
    assert_eq!(
        urlencoding::decode(relative).unwrap(),
        "AC DC/Back in Black/01 - Hells Bells #1.flac"
    );

    let resolved = harness
        .engine
        .storage()
        .resolve_delivered(&handle.session_id.to_string(), &urlencoding::decode(relative).unwrap())
        .await
        .unwrap();
    assert!(resolved.is_file());
}

#[tokio::test]
async fn test_no_audio_files_is_failure_whatever_the_exit_code() {
    for exit_code in [0, 1] {
        let harness = TestHarness::new(MockLauncher::new(move |command| {
            let dest = fixtures::destination_of(command);
            fixtures::write_file(&dest.join("Artist/notes.txt"));
            Ok(ScriptedProcess::new(vec![ScriptStep::line("ERROR: Unsupported URL")])
                .with_exit_code(exit_code))
        }));

        let (_, events) = harness.run("https://example.com/x", Privilege::Anonymous).await;

        let terminal = terminal_events(&events);
        assert_eq!(terminal.len(), 1);
        assert!(terminal[0].is_error());
        let expected = if exit_code == 0 {
            "Error: No valid audio files found."
        } else {
            "Error: Download exited with code 1."
        };
        assert_eq!(terminal[0].message(), expected);
    }
}

#[tokio::test]
async fn test_admin_session_completes_in_place_and_normalizes_topic_folders() {
    let harness = TestHarness::with_config(
        writing_launcher(&["Artist - topic/Album/01 - Song.m4a"], &["[download] 100%"]),
        |config| config.cleanup.deletion_delay_secs = 0,
    );

    let (_, events) = harness
        .run("https://music.youtube.com/watch?v=z", Privilege::Admin)
        .await;

    assert_eq!(
        events,
        vec![
            SessionEvent::Progress("[download] 100%".to_string()),
            SessionEvent::Completed,
        ]
    );
    assert!(harness.admin_dir.join("Artist/Album/01 - Song.m4a").is_file());
    assert!(!harness.admin_dir.join("Artist - topic").exists());

    // Admin downloads are never scheduled for deletion.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(harness.admin_dir.join("Artist/Album/01 - Song.m4a").is_file());
    assert!(!harness.base_dir.exists() || std::fs::read_dir(&harness.base_dir).unwrap().count() == 0);
}

#[tokio::test]
async fn test_admin_rename_leaves_anonymous_downloads_in_shared_root() {
    let harness = TestHarness::with_config(
        writing_launcher(&["Artist - topic/Album/01 - Song.mp3"], &[]),
        |config| config.storage.admin_dir = None,
    );

    let (anonymous, events) = harness
        .run("https://music.youtube.com/watch?v=a", Privilege::Anonymous)
        .await;
    let SessionEvent::Delivery(path) = events.last().unwrap() else {
        panic!("expected delivery, got {:?}", events);
    };
    assert!(path.ends_with("/Artist%20-%20topic/Album/01%20-%20Song.mp3"));
    let delivered = harness
        .base_dir
        .join(anonymous.session_id.to_string())
        .join("Artist - topic/Album/01 - Song.mp3");

    let (_, events) = harness
        .run("https://music.youtube.com/watch?v=b", Privilege::Admin)
        .await;

    assert_eq!(events, vec![SessionEvent::Completed]);
    assert!(harness.base_dir.join("Artist/Album/01 - Song.mp3").is_file());
    assert!(delivered.is_file());
    let relative = urlencoding::decode(path.split_once('/').unwrap().1).unwrap();
    let resolved = harness
        .engine
        .storage()
        .resolve_delivered(&anonymous.session_id.to_string(), &relative)
        .await
        .unwrap();
    assert_eq!(resolved, delivered);
}

#[tokio::test]
async fn test_failed_exit_with_audio_is_reported_as_failure() {
    let harness = TestHarness::new(MockLauncher::new(|command| {
        let dest = fixtures::destination_of(command);
        fixtures::write_file(&dest.join("Artist/Album/01 - A.mp3"));
        fixtures::write_file(&dest.join("Artist/Album/02 - B.mp3"));
        Ok(ScriptedProcess::new(vec![ScriptStep::line("ERROR: fragment 3 not found")]).with_exit_code(1))
    }));

    let (handle, events) = harness.run("https://youtu.be/x", Privilege::Anonymous).await;

    assert_eq!(
        terminal_events(&events)
            .iter()
            .map(|e| e.message())
            .collect::<Vec<_>>(),
        vec!["Error: Download exited with code 1."]
    );
    assert!(!harness
        .base_dir
        .join(handle.session_id.to_string())
        .join("playlist.zip")
        .exists());
}

#[tokio::test]
async fn test_admin_spotdl_session_keeps_folder_names() {
    let harness = TestHarness::new(writing_launcher(&["Artist - topic/01 - Song.mp3", "Artist - topic/02 - Song.mp3"], &[]));

    let (_, events) = harness
        .run("https://open.spotify.com/playlist/p", Privilege::Admin)
        .await;

    assert_eq!(events, vec![SessionEvent::Completed]);
    assert!(harness.admin_dir.join("Artist - topic/01 - Song.mp3").is_file());
}

#[tokio::test]
async fn test_anonymous_session_directory_is_deleted_after_delay() {
    let harness = TestHarness::with_config(writing_launcher(&["a.mp3"], &[]), |config| {
        config.cleanup.deletion_delay_secs = 0;
    });

    let (handle, events) = harness.run("https://youtu.be/x", Privilege::Anonymous).await;

    assert!(matches!(events.last(), Some(SessionEvent::Delivery(_))));
    let dir = harness.base_dir.join(handle.session_id.to_string());
    assert!(wait_until_gone(&dir).await, "session directory was not deleted");
}

#[tokio::test]
async fn test_failed_anonymous_session_is_still_cleaned_up() {
    let harness = TestHarness::with_config(MockLauncher::silent(), |config| {
        config.cleanup.deletion_delay_secs = 0;
    });

    let (handle, events) = harness.run("https://youtu.be/x", Privilege::Anonymous).await;

    assert_eq!(events, vec![SessionEvent::NoAudioFiles]);
    let dir = harness.base_dir.join(handle.session_id.to_string());
    assert!(wait_until_gone(&dir).await);
}

#[tokio::test]
async fn test_concurrent_sessions_are_independent() {
    let harness = Arc::new(TestHarness::new(writing_launcher(&["x/1.mp3"], &["line"])));

    let mut tasks = Vec::new();
    for _ in 0..5 {
        let harness = Arc::clone(&harness);
        tasks.push(tokio::spawn(async move {
            harness.run("https://youtu.be/x", Privilege::Anonymous).await
        }));
    }

    let mut ids = Vec::new();
    for task in tasks {
        let (handle, events) = task.await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(
            events[1],
            SessionEvent::Delivery(format!("{}/x/1.mp3", handle.session_id))
        );
        ids.push(handle.session_id);
    }
    ids.sort_by_key(|id| id.to_string());
    ids.dedup();
    assert_eq!(ids.len(), 5);
    assert_eq!(harness.launcher.launch_count(), 5);
}

#[tokio::test]
async fn test_sweeper_removes_stale_directories() {
    let harness = TestHarness::with_config(MockLauncher::silent(), |config| {
        config.cleanup.interval_secs = 1;
    });
    for name in ["stale-1", "stale-2", "stale-3"] {
        fixtures::write_file(&harness.base_dir.join(name).join("song.mp3"));
    }

    harness.engine.start();
    tokio::time::sleep(Duration::from_millis(1500)).await;
    harness.engine.stop();

    for name in ["stale-1", "stale-2", "stale-3"] {
        assert!(!harness.base_dir.join(name).exists(), "{name} survived the sweep");
    }
    assert!(harness.base_dir.exists());
}
