use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use comfy_table::{Cell, Table};
use dialoguer::{Input, Select};

use mcdn_source::config::{self, McdnConfig, DEFAULT_USER_AGENT};
use mcdn_source::core::decoder::{CancellationToken, PlaybackOutcome};
use mcdn_source::core::sink::PcmSink;
use mcdn_source::{AudioItem, McdnSource, McdnTrack, MusicSource, TrackMetadata};

#[derive(Parser)]
#[command(name = "mcdn", about = "MCDN 카탈로그 트랙 조회 및 재생 도구")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 검색어로 트랙 검색
    Search {
        /// 검색어
        query: String,
    },
    /// ISRC로 트랙 조회
    Isrc {
        /// ISRC 코드
        code: String,
    },
    /// 식별자 조회 (mcdnsearch:..., mcdnisrc:...)
    Resolve {
        /// 조회할 식별자
        identifier: String,
    },
    /// 트랙을 디코딩하여 raw f32 PCM 파일로 저장
    Play {
        /// 재생할 식별자
        identifier: String,
        /// 출력 파일 경로
        #[arg(long, short, default_value = "out.pcm")]
        output: PathBuf,
        /// 앞부분 N초만 디코딩
        #[arg(long)]
        seconds: Option<u64>,
    },
    /// MCDN 접속 정보 설정
    Config,
}

pub fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Search { query } => cmd_search(&query),
        Commands::Isrc { code } => cmd_isrc(&code),
        Commands::Resolve { identifier } => cmd_resolve(&identifier),
        Commands::Play {
            identifier,
            output,
            seconds,
        } => cmd_play(&identifier, &output, seconds),
        Commands::Config => cmd_config(),
    }
}

fn build_source() -> Result<McdnSource> {
    let cfg = config::load_config();

    if !cfg.mcdn.is_configured() {
        bail!("MCDN이 설정되지 않았습니다. 먼저 'mcdn config'를 실행하세요.");
    }

    McdnSource::new(cfg.mcdn, cfg.http).context("MCDN 리졸버 생성에 실패했습니다")
}

fn print_tracks(tracks: &[TrackMetadata]) {
    let mut table = Table::new();
    table.set_header(vec!["#", "제목", "아티스트", "길이", "ISRC", "ID"]);

    for (i, track) in tracks.iter().enumerate() {
        table.add_row(vec![
            Cell::new(i + 1),
            Cell::new(&track.title),
            Cell::new(&track.artist),
            Cell::new(track.display_duration()),
            Cell::new(track.isrc.as_deref().unwrap_or("-")),
            Cell::new(&track.id),
        ]);
    }

    println!("{table}");
}

fn cmd_search(query: &str) -> Result<()> {
    let source = build_source()?;
    let results = source.search(query).context("MCDN 검색에 실패했습니다");
    source.shutdown();
    let results = results?;

    if results.is_empty() {
        println!("검색 결과가 없습니다.");
        return Ok(());
    }

    print_tracks(&results);
    println!("\n총 {}곡", results.len());
    Ok(())
}

fn cmd_isrc(code: &str) -> Result<()> {
    let source = build_source()?;
    let result = source.lookup_isrc(code).context("ISRC 조회에 실패했습니다");
    source.shutdown();

    match result? {
        Some(track) => {
            print_tracks(std::slice::from_ref(&track));
            println!("URL: {}", track.direct_url);
        }
        None => println!("{}에 해당하는 트랙이 없습니다.", code),
    }
    Ok(())
}

fn cmd_resolve(identifier: &str) -> Result<()> {
    let source = build_source()?;

    match source
        .load_item(identifier)
        .context("식별자 조회에 실패했습니다")?
    {
        None => println!("mcdn 소스가 처리하지 않는 식별자입니다: {}", identifier),
        Some(AudioItem::NoTrack) => println!("일치하는 트랙이 없습니다."),
        Some(AudioItem::Track(track)) => {
            print_tracks(std::slice::from_ref(track.info()));
            println!("URL: {}", track.info().direct_url);
        }
        Some(AudioItem::Playlist(playlist)) => {
            println!("{}", playlist.name);
            let infos: Vec<TrackMetadata> =
                playlist.tracks.iter().map(|t| t.info().clone()).collect();
            print_tracks(&infos);
        }
    }

    source.shutdown();
    Ok(())
}

fn select_track<'a>(source: &'a McdnSource, identifier: &str) -> Result<Option<McdnTrack<'a>>> {
    let item = source
        .load_item(identifier)
        .context("식별자 조회에 실패했습니다")?;

    match item {
        None => {
            println!("mcdn 소스가 처리하지 않는 식별자입니다: {}", identifier);
            Ok(None)
        }
        Some(AudioItem::NoTrack) => {
            println!("일치하는 트랙이 없습니다.");
            Ok(None)
        }
        Some(AudioItem::Track(track)) => Ok(Some(track)),
        Some(AudioItem::Playlist(playlist)) => {
            let items: Vec<String> = playlist.tracks.iter().map(|t| t.info().summary()).collect();

            let selection = Select::new()
                .with_prompt(format!("{} - 트랙을 선택하세요", playlist.name))
                .items(&items)
                .default(playlist.selected.unwrap_or(0))
                .interact()?;

            Ok(playlist.tracks.into_iter().nth(selection))
        }
    }
}

fn cmd_play(identifier: &str, output: &PathBuf, seconds: Option<u64>) -> Result<()> {
    let source = build_source()?;

    let track = match select_track(&source, identifier)? {
        Some(track) => track,
        None => {
            source.shutdown();
            return Ok(());
        }
    };

    println!("재생 중: {}", track.info().summary());

    let file = File::create(output)
        .with_context(|| format!("출력 파일을 만들 수 없습니다: {}", output.display()))?;
    let mut sink = PcmSink::new(BufWriter::new(file), seconds.map(|s| s * 1000));

    let outcome = track
        .play(&mut sink, &CancellationToken::new())
        .context("재생에 실패했습니다")?;
    sink.flush()
        .with_context(|| format!("출력 파일에 쓰지 못했습니다: {}", output.display()))?;

    match (outcome, sink.format()) {
        (PlaybackOutcome::Completed, Some((channels, rate))) => println!(
            "완료: {} 프레임 ({}채널, {} Hz) → {}",
            sink.frames_written(),
            channels,
            rate,
            output.display()
        ),
        (PlaybackOutcome::Completed, None) => println!("디코딩된 오디오가 없습니다."),
        (PlaybackOutcome::Cancelled, _) => println!("재생이 취소되었습니다."),
    }

    source.shutdown();
    Ok(())
}

fn cmd_config() -> Result<()> {
    // 환경 변수 값이 파일에 저장되지 않도록 파일 내용만 읽는다.
    let mut cfg = config::load_config_file();

    println!("MCDN API 설정\n");

    let base_url: String = Input::new()
        .with_prompt("Base URL")
        .with_initial_text(cfg.mcdn.base_url.clone())
        .interact_text()?;

    let api_key: String = Input::new()
        .with_prompt("API Key")
        .with_initial_text(cfg.mcdn.api_key.clone())
        .interact_text()?;

    let user_agent: String = Input::new()
        .with_prompt(format!("User-Agent (비우면 {})", DEFAULT_USER_AGENT))
        .with_initial_text(cfg.mcdn.user_agent.clone().unwrap_or_default())
        .allow_empty(true)
        .interact_text()?;

    cfg.mcdn = McdnConfig {
        base_url,
        api_key,
        user_agent: if user_agent.trim().is_empty() {
            None
        } else {
            Some(user_agent)
        },
    };

    config::save_config(&cfg)?;
    println!("\n설정이 저장되었습니다!");
    Ok(())
}
