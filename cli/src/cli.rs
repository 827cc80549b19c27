use std::io::{self, BufRead, Write};

use anyhow::{Context, Result, anyhow, bail};
use rtsim_core::{
    MlcType, SCENE_HEIGHT, SCENE_WIDTH, Technique, TreatmentSession, TumorShape, clinical_notes,
    technical_notes,
};

pub fn run(session: &mut TreatmentSession) -> Result<()> {
    print_intro(session);
    let stdin = io::stdin();

    loop {
        print!("第{}回> ", session.fraction());
        io::stdout()
            .flush()
            .context("プロンプトのフラッシュに失敗しました")?;

        let mut line = String::new();
        let bytes = stdin
            .lock()
            .read_line(&mut line)
            .context("入力の読み込みに失敗しました")?;

        if bytes == 0 {
            println!("入力が終了したためシミュレーターを終了します。");
            return Ok(());
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        if let Err(error) = dispatch_command(session, trimmed) {
            println!("エラー: {error}");
        }
    }
}

fn dispatch_command(session: &mut TreatmentSession, input: &str) -> Result<()> {
    let mut parts = input.split_whitespace();
    let command = parts
        .next()
        .ok_or_else(|| anyhow!("コマンドが指定されていません。"))?
        .to_ascii_lowercase();

    match command.as_str() {
        "help" | "?" => {
            print_help();
            Ok(())
        }
        "status" | "st" => {
            print_status(session);
            Ok(())
        }
        "info" => {
            print_info(session);
            Ok(())
        }
        "clinical" => {
            print_clinical(session);
            Ok(())
        }
        "technical" => {
            print_technical(session);
            Ok(())
        }
        "technique" | "tech" => {
            let token = parts
                .next()
                .ok_or_else(|| anyhow!("治療技法を指定してください。"))?;
            let technique = parse_technique(token)?;
            session.set_technique(technique);
            println!(
                "治療技法を {} に変更しました。治療状態は初期化されます。",
                technique.label()
            );
            Ok(())
        }
        "shape" => {
            let token = parts
                .next()
                .ok_or_else(|| anyhow!("腫瘍形状を指定してください (round / irregular)。"))?;
            let shape = TumorShape::from_key(token)
                .ok_or_else(|| anyhow!("未知の腫瘍形状です: {token} (round / irregular)"))?;
            session.set_tumor_shape(shape);
            println!("腫瘍形状を {} に変更しました。", shape.label());
            Ok(())
        }
        "energy" => {
            let value = parse_number(parts.next(), "ビームエネルギー (MeV)")?;
            session.set_beam_energy(value)?;
            println!("ビームエネルギーを {value} MeV に設定しました。");
            Ok(())
        }
        "width" => {
            let value = parse_number(parts.next(), "ビーム幅 (mm)")?;
            session.set_beam_width(value)?;
            println!("ビーム幅を {value} mm に設定しました。");
            Ok(())
        }
        "mlc" => match parts.next() {
            None => {
                print_mlc(session);
                Ok(())
            }
            Some("type") => {
                let token = parts
                    .next()
                    .ok_or_else(|| anyhow!("MLC 型を指定してください (standard / hd / micro)。"))?;
                let mlc_type = MlcType::from_key(token)
                    .ok_or_else(|| anyhow!("未知の MLC 型です: {token} (standard / hd / micro)"))?;
                session.set_mlc_type(mlc_type)?;
                println!("MLC を {} に切り替えました。", mlc_type.label());
                Ok(())
            }
            Some("adjust") => {
                let value = parse_number(parts.next(), "リーフ移動量")?;
                session.adjust_mlc_leaves(value)?;
                println!("MLC リーフを {value} だけ駆動しました。");
                Ok(())
            }
            Some(other) => bail!("未知の MLC 操作です: {other} (type / adjust)"),
        },
        "start" => {
            let reports = session.start()?;
            for report in reports {
                println!("- {report}");
            }
            Ok(())
        }
        "pause" => {
            session.pause()?;
            println!("治療を一時停止しました。位置と線量は保持されます。");
            Ok(())
        }
        "resume" => {
            session.resume()?;
            println!("治療を再開します。");
            Ok(())
        }
        "reset" => {
            session.reset();
            println!("シミュレーションを初期化しました。");
            Ok(())
        }
        "run" => {
            let seconds = parse_number(parts.next(), "秒数")?;
            let reports = session.advance(seconds)?;
            println!("--- {seconds} 秒 進めました ---");
            for report in &reports {
                println!("- {report}");
            }
            if reports.is_empty() {
                println!("(進行中のイベントはありません)");
            }
            let status = session.status();
            println!(
                "ガントリ {:.0}° / 累積線量 {:.1}% / 第{}回",
                status.gantry_angle, status.accumulated_dose, status.fraction
            );
            Ok(())
        }
        "dose" => {
            let path = parts
                .next()
                .ok_or_else(|| anyhow!("出力先のパスを指定してください。"))?;
            export_dose(session, path)
        }
        "save" => {
            let path = parts
                .next()
                .ok_or_else(|| anyhow!("保存先のパスを指定してください。"))?;
            save_snapshot(session, path)
        }
        "load" => {
            let path = parts
                .next()
                .ok_or_else(|| anyhow!("読み込むパスを指定してください。"))?;
            load_snapshot(session, path)
        }
        "quit" | "exit" => {
            println!("シミュレーターを終了します。");
            std::process::exit(0);
        }
        other => {
            bail!("未知のコマンドです: {other}. help で一覧を確認してください。");
        }
    }
}

fn print_intro(session: &TreatmentSession) {
    println!("放射線治療シミュレーターへようこそ。");
    println!(
        "現在の治療技法: {} (全{}回)",
        session.technique().label(),
        session.params().fractions
    );
    println!("コマンド例: status / technique vmat / start / run 30 / dose dose.ppm");
    println!("help で利用可能なコマンド一覧を表示します。");
}

fn print_help() {
    println!("利用可能なコマンド:");
    println!("  status                現在の照射状態を表示");
    println!("  info                  治療技法のパラメータを表示");
    println!("  clinical              臨床参照情報を表示");
    println!("  technical             技術参照情報を表示");
    println!("  technique <技法>      治療技法を変更 (2d / 3d / imrt / vmat / srs / sbrt)");
    println!("  shape <形状>          腫瘍形状を変更 (round / irregular)");
    println!("  energy <MeV>          ビームエネルギーを設定");
    println!("  width <mm>            ビーム幅を設定");
    println!("  mlc                   MLC の状態を表示");
    println!("  mlc type <型>         MLC 型を変更 (standard / hd / micro)");
    println!("  mlc adjust <量>       MLC リーフを一括駆動 (-20〜20)");
    println!("  start                 治療を開始");
    println!("  pause / resume        治療を一時停止 / 再開");
    println!("  reset                 シミュレーションを初期化");
    println!("  run <秒>              シミュレーション時間を進める");
    println!("  dose <パス>           線量分布を PPM 画像として書き出す");
    println!("  save <パス>           状態スナップショットを保存");
    println!("  load <パス>           状態スナップショットを読み込む");
    println!("  quit                  終了");
}

fn print_status(session: &TreatmentSession) {
    let status = session.status();
    println!("-- 照射状態 --");
    println!("治療技法: {}", status.technique.label());
    println!("ガントリ角度: {:.0}°", status.gantry_angle);
    println!("照射野: {}", status.field_label);
    println!("累積線量: {:.1}%", status.accumulated_dose);
    println!("分割回数: {}/{}", status.fraction, status.total_fractions);
    println!(
        "ビーム: {}",
        if status.beam_on {
            "照射中"
        } else {
            "停止中"
        }
    );
    let state = if status.finished {
        "完了"
    } else if status.paused {
        "一時停止中"
    } else if status.running {
        "進行中"
    } else {
        "待機中"
    };
    println!("状態: {state}");
}

fn print_info(session: &mut TreatmentSession) {
    let technique = session.technique();
    let minutes = session.estimated_minutes();
    let params = session.params();
    println!("-- {} --", technique.label());
    println!("ビーム形状: {}", params.beam_shape.label());
    println!("照射野数: {}", params.fields.len());
    println!("計画マージン: {} mm", params.margin_mm);
    println!("精度: {}%", params.precision);
    println!("正常組織の保護: {}%", params.tissue_protection);
    println!("分割回数: {}", params.fractions);
    match &params.mlc {
        Some(spec) => {
            let mode = if spec.continuous {
                "連続駆動"
            } else if spec.dynamic {
                "動的"
            } else {
                "静的"
            };
            println!("MLC: リーフ幅 {} mm ({mode})", spec.leaf_width_mm);
        }
        None => println!("MLC: なし"),
    }
    println!("推定治療時間: {minutes:.1} 分");
}

fn print_clinical(session: &TreatmentSession) {
    let notes = clinical_notes(session.technique());
    println!("-- 臨床情報: {} --", session.technique().label());
    for (label, value) in notes.rows() {
        println!("{label}: {value}");
    }
}

fn print_technical(session: &TreatmentSession) {
    let notes = technical_notes(session.technique());
    println!("-- 技術情報: {} --", session.technique().label());
    for (label, value) in notes.rows() {
        println!("{label}: {value}");
    }
}

fn print_mlc(session: &TreatmentSession) {
    let available = MlcType::available_for(session.technique());
    if available.is_empty() {
        println!(
            "{} では MLC を利用できません。",
            session.technique().label()
        );
        return;
    }

    let labels: Vec<&str> = available.iter().map(|t| t.label()).collect();
    println!("利用可能な MLC: {}", labels.join(" / "));

    if let Some(bank) = session.mlc() {
        let characteristics = bank.mlc_type().characteristics();
        println!(
            "選択中: {} (リーフ幅 {} mm, {} 対)",
            bank.mlc_type().label(),
            characteristics.leaf_width_mm,
            characteristics.pairs
        );
        if let Some(pair) = bank.pairs().first() {
            println!("リーフ位置: 上段 {} / 下段 {}", pair.left, pair.right);
        }
    }
}

fn export_dose(session: &TreatmentSession, path: &str) -> Result<()> {
    let grid = session.dose_grid(SCENE_WIDTH as usize, SCENE_HEIGHT as usize);
    let rgba = grid.to_rgba();

    let mut data = Vec::with_capacity(grid.width() * grid.height() * 3 + 32);
    data.extend_from_slice(format!("P6\n{} {}\n255\n", grid.width(), grid.height()).as_bytes());
    for pixel in rgba.chunks_exact(4) {
        let alpha = pixel[3] as f64 / 255.0;
        for channel in 0..3 {
            let blended = pixel[channel] as f64 * alpha + 255.0 * (1.0 - alpha);
            data.push(blended.round() as u8);
        }
    }

    std::fs::write(path, data).with_context(|| format!("線量分布の書き出しに失敗しました: {path}"))?;
    println!("線量分布を書き出しました: {path}");
    Ok(())
}

fn save_snapshot(session: &TreatmentSession, path: &str) -> Result<()> {
    let json = serde_json::to_string_pretty(&session.snapshot())
        .context("スナップショットの変換に失敗しました")?;
    std::fs::write(path, json)
        .with_context(|| format!("スナップショットの保存に失敗しました: {path}"))?;
    println!("状態を保存しました: {path}");
    Ok(())
}

fn load_snapshot(session: &mut TreatmentSession, path: &str) -> Result<()> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("スナップショットを開けません: {path}"))?;
    let snapshot = serde_json::from_str(&json)
        .with_context(|| format!("スナップショットの解析に失敗しました: {path}"))?;
    *session = TreatmentSession::from_snapshot(snapshot)
        .with_context(|| format!("スナップショットの復元に失敗しました: {path}"))?;
    println!("状態を読み込みました: {path}");
    Ok(())
}

fn parse_technique(token: &str) -> Result<Technique> {
    Technique::from_key(token)
        .ok_or_else(|| anyhow!("未知の治療技法です: {token} (2d / 3d / imrt / vmat / srs / sbrt)"))
}

fn parse_number(token: Option<&str>, label: &str) -> Result<f64> {
    let token = token.ok_or_else(|| anyhow!("{label}を指定してください。"))?;
    token
        .parse::<f64>()
        .map_err(|_| anyhow!("{label}は数値で指定してください: {token}"))
}
