use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use avatar_voice::audio::{DeviceRegistry, find_by_name_fragment};
use avatar_voice::conversation::CHARACTER_NAME;
use avatar_voice::voice::{ListenSettings, Listener, SpeechRecognizer, Synthesizer, Voicevox};
use avatar_voice::{
    ChatSession, Config, Conversation, CpalBackend, InputSource, Interrupt, Speaker, TextInput,
    VoiceInput,
};

/// Time allowed for blocked tasks (a pending stdin read) after the loop ends
const SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

const BANNER: &str = "==================================================";

/// avatar-voice - talk to a lip-synced avatar character
#[derive(Parser)]
#[command(name = "avatar-voice", version, about)]
struct Cli {
    /// Type instead of speaking (no microphone needed)
    #[arg(long)]
    text: bool,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// List output devices and show which one is used as the cable
    Devices,
    /// Synthesize one line and play it to the speaker and cable
    Say {
        /// Text to speak
        #[arg(default_value = "テストだよ♡ ちゃんと聞こえてる？")]
        text: String,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "warn,avatar_voice=info",
        1 => "info,avatar_voice=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    // Playback blocks a worker with block_in_place, which needs the multi-threaded scheduler
    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::error!("fatal: failed to start runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    let result = runtime.block_on(run(cli));
    runtime.shutdown_timeout(SHUTDOWN_GRACE);

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

#[allow(clippy::future_not_send)]
async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::load()?;
    tracing::debug!(
        model = %config.gemini.model,
        voicevox = %config.voicevox.host,
        speaker_id = config.voicevox.speaker_id,
        cable = %config.cable_device,
        "loaded configuration"
    );

    match cli.command {
        Some(Command::Devices) => list_devices(&config),
        Some(Command::Say { text }) => say(&config, &text).await,
        None => converse(config, cli.text).await,
    }
}

/// Set the interrupt flag when the user presses Ctrl-C
fn watch_ctrl_c() -> Interrupt {
    let interrupt = Interrupt::new();
    let flag = interrupt.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "failed to listen for Ctrl-C");
            return;
        }
        tracing::debug!("Ctrl-C received");
        flag.trigger();
    });
    interrupt
}

#[allow(clippy::future_not_send)]
async fn converse(config: Config, text_mode: bool) -> anyhow::Result<()> {
    if let Err(e) = config.require_api_key() {
        println!("エラー: GEMINI_API_KEY が設定されていません。");
        println!(".env ファイルを作成して API キーを設定してください。");
        println!("  cp .env.example .env");
        println!("  # .env を編集して GEMINI_API_KEY を設定");
        return Err(e.into());
    }

    println!("{BANNER}");
    println!("  {CHARACTER_NAME}AI 起動中...");
    println!("{BANNER}");

    let chat = ChatSession::new(
        config.gemini.api_key.clone(),
        config.gemini.model.clone(),
        config.system_prompt.clone(),
    )?;
    println!("🤖 Gemini API 準備OK ({})", chat.model());

    let voicevox = Voicevox::new(config.voicevox.host.clone(), config.voicevox.speaker_id);
    let synthesizer: Option<Box<dyn Synthesizer>> = match voicevox.check_connection().await {
        Ok(version) => {
            println!("🔊 VOICEVOX 接続OK (version: {version})");
            Some(Box::new(voicevox))
        }
        Err(e) => {
            tracing::debug!(error = %e, "VOICEVOX connection check failed");
            println!("⚠️  VOICEVOXに接続できません。VOICEVOXを起動してから再実行してください。");
            None
        }
    };

    let interrupt = watch_ctrl_c();
    let backend = Arc::new(CpalBackend::new());
    let speaker = Speaker::new(backend, config.cable_device.clone(), interrupt.clone());

    let mut input: Box<dyn InputSource> = if text_mode {
        Box::new(TextInput::stdin())
    } else {
        match open_microphone(&config).await {
            Ok(listener) => Box::new(VoiceInput::new(listener)),
            Err(e) => {
                println!("⚠️  マイクが見つかりません: {e}");
                println!("テキストモードに切り替えます。");
                Box::new(TextInput::stdin())
            }
        }
    };

    println!("{BANNER}");
    println!("  準備完了！");
    println!("{BANNER}");

    let mut conversation = Conversation::new(chat, speaker, synthesizer, interrupt);
    conversation.run(input.as_mut()).await?;

    Ok(())
}

#[allow(clippy::future_not_send)]
async fn open_microphone(config: &Config) -> avatar_voice::Result<Listener> {
    let recognizer = SpeechRecognizer::new(config.stt.api_key.clone(), config.stt.language.clone())?;
    Listener::new(recognizer, ListenSettings::default()).await
}

/// Print output devices, marking the default speaker and the cable match
fn list_devices(config: &Config) -> anyhow::Result<()> {
    let registry = DeviceRegistry::new(CpalBackend::new());
    let endpoints = registry.enumerate_outputs()?;
    let speaker = registry.default_output();
    let cable = find_by_name_fragment(&config.cable_device, &endpoints);

    println!("Output devices:");
    for endpoint in &endpoints {
        let mut marks = Vec::new();
        if speaker.as_ref().is_some_and(|s| s.name == endpoint.name) {
            marks.push("speaker");
        }
        if cable.is_some_and(|c| c.index == endpoint.index) {
            marks.push("cable");
        }

        let marks = if marks.is_empty() {
            String::new()
        } else {
            format!("  <- {}", marks.join(", "))
        };
        println!(
            "  [{:2}] {} ({} ch){marks}",
            endpoint.index, endpoint.name, endpoint.output_channels
        );
    }

    if cable.is_none() {
        println!(
            "\nNo output matches {:?}; replies will play on the speaker only.",
            config.cable_device
        );
    }

    Ok(())
}

/// Speak one line through VOICEVOX to the speaker and cable
#[allow(clippy::future_not_send)]
async fn say(config: &Config, text: &str) -> anyhow::Result<()> {
    let voicevox = Voicevox::new(config.voicevox.host.clone(), config.voicevox.speaker_id);
    let version = voicevox.check_connection().await?;
    println!("VOICEVOX {version} at {}", voicevox.host());

    let interrupt = watch_ctrl_c();
    let mut speaker = Speaker::new(
        Arc::new(CpalBackend::new()),
        config.cable_device.clone(),
        interrupt,
    );

    println!("{CHARACTER_NAME}: {text}");
    speaker.speak(text, &voicevox).await;

    match speaker.cable().endpoint() {
        Some(cable) => println!("Played to the speaker and {}", cable.name),
        None => println!("Played to the speaker only (no cable device found)"),
    }

    Ok(())
}
