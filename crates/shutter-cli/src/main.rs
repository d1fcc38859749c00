use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use shutter_core::{CommandTarget, TargetError, Task, TaskConfig, bind, from_fn};
use tokio::time::{Duration, sleep};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// Used when no config path is given on the command line.
const ATTRACT_CONFIG: &str = r#"{
    "name": "attract",
    "executions": 0,
    "autostart": true,
    "poll_interval_ms": 10
}"#;

#[derive(Debug, Clone)]
struct Blink {
    label: &'static str,
    speed: Duration,
}

/// One blink per `speed`: on for a quarter, off for the rest (at most 10/s).
async fn blink(args: Blink) -> Result<(), TargetError> {
    let speed = args.speed.max(Duration::from_millis(100));
    debug!(led = args.label, "on");
    sleep(speed / 4).await;
    debug!(led = args.label, "off");
    sleep(speed * 3 / 4).await;
    Ok(())
}

/// Stand-in for the camera tool: a child process that blocks for a while and
/// reports where the shot was saved.
fn capture() -> CommandTarget {
    let stamp = chrono::Utc::now().format("%Y%m%dT%H%M%S%.3f");
    CommandTarget::new("sh")
        .args(["-c", "sleep 0.15; echo \"$0\""])
        .arg(format!("/var/lib/photobooth/shots/{stamp}.jpg"))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // (A) attract モード: 設定ファイル（なければ組み込み設定）から unbounded で起動
    let attract_config = match std::env::args().nth(1) {
        Some(path) => TaskConfig::from_json(&std::fs::read_to_string(path)?)?,
        None => TaskConfig::from_json(ATTRACT_CONFIG)?,
    };
    let mut attract = Task::from_config(
        bind(
            Blink {
                label: "shutter_rdy",
                speed: Duration::from_millis(200),
            },
            blink,
        ),
        &attract_config,
    )?;
    if attract.run_id().is_none() {
        attract.start()?;
    }

    // (B) capture ボタンが押された想定: アニメーションはフレーム途中でも止める
    sleep(Duration::from_millis(500)).await;
    info!("capture pressed");
    attract.stop_immediately().await?;

    // (C) カウントダウン（bounded なので勝手に終わる）
    let remaining = Arc::new(AtomicU32::new(3));
    let mut countdown = Task::builder(from_fn(move || {
        let remaining = Arc::clone(&remaining);
        async move {
            let digit = remaining.fetch_sub(1, Ordering::SeqCst);
            info!(digit, "countdown");
            sleep(Duration::from_millis(200)).await;
            Ok::<_, TargetError>(digit)
        }
    }))
    .name("countdown")
    .executions(3)
    .autostart(true)
    .build()?;
    countdown.wait().await;

    // (D) 撮影（子プロセスなので途中で kill できる）
    let mut shutter = Task::builder(capture())
        .name("capture")
        .executions(1)
        .build()?;
    shutter.start()?;
    let state = shutter.wait().await;
    match shutter.failure() {
        Some(failure) => warn!(%state, error = failure.message(), "capture failed"),
        None => {
            for output in shutter.drain() {
                info!(path = output.stdout.trim(), "photo captured");
            }
        }
    }

    // (E) 印刷中ランプ: bounded なので graceful stop は点滅が終わるまで待つ
    let mut flash = Task::builder(bind(
        Blink {
            label: "printing",
            speed: Duration::from_millis(100),
        },
        blink,
    ))
    .name("print-flash")
    .executions(5)
    .autostart(true)
    .build()?;
    flash.stop_graceful().await?;

    // (F) attract モードに戻してから終了
    attract.restart().await?;
    sleep(Duration::from_millis(300)).await;
    attract.stop_graceful().await?;

    let statuses = [
        attract.status(),
        countdown.status(),
        shutter.status(),
        flash.status(),
    ];
    println!("{}", serde_json::to_string_pretty(&statuses)?);
    Ok(())
}
