use std::path::Path;

use mvgen_queue::QueueName;
use mvgen_worker::WorkerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = WorkerConfig::from_env()?;

    println!(
        "worker-selfcheck: starting with work_dir={} queues={:?}",
        config.work_dir.display(),
        config.queues
    );
    ensure_workdir(&config.work_dir).await?;
    ensure_env_present(&["REDIS_URL"])?;

    if config.consumes(QueueName::Audio) || config.consumes(QueueName::Clip) {
        mvgen_gateway::GatewayConfig::from_env()?;
    }
    if config.consumes(QueueName::Finishing) {
        ensure_media_tools()?;
        mvgen_storage::StorageConfig::from_env()?;
        mvgen_catalog::CatalogConfig::from_env()?;
    }

    println!("worker-selfcheck: ok");
    Ok(())
}

async fn ensure_workdir<P: AsRef<Path>>(path: P) -> anyhow::Result<()> {
    let path = path.as_ref();
    tokio::fs::create_dir_all(path).await?;
    Ok(())
}

fn ensure_media_tools() -> anyhow::Result<()> {
    let ffmpeg = mvgen_media::check_ffmpeg().map_err(|e| anyhow::anyhow!("ffmpeg not available: {}", e))?;
    let ffprobe = mvgen_media::check_ffprobe().map_err(|e| anyhow::anyhow!("ffprobe not available: {}", e))?;
    println!("worker-selfcheck: ffmpeg={} ffprobe={}", ffmpeg.display(), ffprobe.display());
    Ok(())
}

fn ensure_env_present(vars: &[&str]) -> anyhow::Result<()> {
    for var in vars {
        if std::env::var(var).is_err() {
            return Err(anyhow::anyhow!("missing required env var {}", var));
        }
    }
    Ok(())
}
