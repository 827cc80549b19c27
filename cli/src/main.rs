mod cli;

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rtsim_core::{SessionConfig, TreatmentSession};

fn main() -> Result<()> {
    let config = load_config()?;
    let rng = StdRng::from_entropy();
    let mut session =
        TreatmentSession::with_rng(config, rng).context("セッションの初期化に失敗しました")?;
    cli::run(&mut session)
}

fn load_config() -> Result<SessionConfig> {
    let Some(config_path) = resolve_config_path()? else {
        println!("セッション設定ファイルが見つからないため、既定の設定で開始します。");
        return Ok(SessionConfig::default());
    };

    let file = File::open(&config_path).with_context(|| {
        format!(
            "セッション設定ファイルを開けません: {}",
            config_path.display()
        )
    })?;
    let reader = BufReader::new(file);
    let config: SessionConfig = serde_json::from_reader(reader).with_context(|| {
        format!(
            "セッション設定ファイルの解析に失敗しました: {}",
            config_path.display()
        )
    })?;
    config.validate().with_context(|| {
        format!(
            "セッション設定ファイルの内容が不正です: {}",
            config_path.display()
        )
    })?;
    Ok(config)
}

fn resolve_config_path() -> Result<Option<PathBuf>> {
    let cwd = std::env::current_dir().context("カレントディレクトリの取得に失敗しました")?;
    let candidates = [
        cwd.join("config").join("session.json"),
        Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("..")
            .join("config")
            .join("session.json"),
    ];

    for path in candidates {
        if path.exists() {
            return Ok(Some(path));
        }
    }

    Ok(None)
}
