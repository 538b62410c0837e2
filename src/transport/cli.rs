//! CLI transport for direct terminal interaction

use crate::chat::{self, annotate_message, AgentClient, ChatEvent, ChatReply, CozeClient};
use crate::config::{Config, MethodPreference};
use crate::diagnostics::DiagnosticReporter;
use crate::location::{LocationResolver, LocationResult};
use crate::record;
use anyhow::{Context, Result};
use colored::Colorize;
use std::io::{self, BufRead, Write};

const SECTION_RULE: usize = 60;
const TURN_RULE: usize = 50;

/// Words that end the interactive loop (compared case-insensitively)
const EXIT_WORDS: [&str; 3] = ["quit", "exit", "退出"];

/// Shared HTTP client for the geolocation services
pub fn build_http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(concat!("geochat/", env!("CARGO_PKG_VERSION")))
        .connect_timeout(std::time::Duration::from_secs(5))
        .build()
        .context("Failed to create HTTP client")
}

/// What a line typed at the prompt asks for
#[derive(Debug, PartialEq, Eq)]
pub enum LoopInput<'a> {
    Exit,
    Empty,
    Message(&'a str),
}

impl<'a> LoopInput<'a> {
    pub fn classify(line: &'a str) -> Self {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            LoopInput::Empty
        } else if EXIT_WORDS.contains(&trimmed.to_lowercase().as_str()) {
            LoopInput::Exit
        } else {
            LoopInput::Message(trimmed)
        }
    }
}

fn render_event(out: &mut impl Write, event: &ChatEvent) -> io::Result<()> {
    match event {
        ChatEvent::ContentFragment(text) => {
            write!(out, "{}", text)?;
            out.flush()
        }
        ChatEvent::TurnCompleted(usage) => {
            writeln!(out)?;
            writeln!(out, "token usage: {}", usage.token_count)?;
            writeln!(out, "{}", "-".repeat(TURN_RULE))
        }
        // Reported once, by whoever handles the resulting error
        ChatEvent::Failed { .. } => writeln!(out),
    }
}

/// Interactive agent chat with a location annotation on every turn
pub struct ChatSession {
    agent: Box<dyn AgentClient>,
    resolver: LocationResolver,
    method: MethodPreference,
    debug: bool,
}

impl ChatSession {
    pub fn new(
        agent: Box<dyn AgentClient>,
        resolver: LocationResolver,
        method: MethodPreference,
    ) -> Self {
        Self {
            agent,
            resolver,
            method,
            debug: false,
        }
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Print the greeting and the location detected at startup
    pub async fn print_banner(&self, out: &mut impl Write) -> Result<LocationResult> {
        writeln!(out, "{}", "=== Coze 智能体对话（高德地图定位）===".bold().cyan())?;
        writeln!(out, "💡 提示: 每次对话都会自动附加您的当前位置信息")?;
        writeln!(out, "🗺️  定位方式: {}", self.method.as_str().to_uppercase())?;
        writeln!(
            out,
            "🔧 调试: 在配置文件中设置 debug = true 或使用 --debug 可查看发送给AI的完整消息"
        )?;
        writeln!(out, "输入 'quit' 或 'exit' 退出对话")?;
        writeln!(out, "{}", "-".repeat(SECTION_RULE))?;

        let location = self.resolver.resolve().await;
        writeln!(out, "📍 检测到您的位置: {}", location)?;
        writeln!(out, "🔍 定位方式: {}", location.method)?;
        writeln!(out, "{}", "-".repeat(SECTION_RULE))?;
        Ok(location)
    }

    /// Run one turn: resolve, annotate, stream the reply to `out`
    pub async fn turn<W: Write + Send>(&self, text: &str, out: &mut W) -> Result<ChatReply> {
        writeln!(out, "用户输入: {}", text)?;

        let location = self.resolver.resolve().await;
        let message = annotate_message(text, &location);

        if self.debug {
            writeln!(out, "[调试] 定位方式: {}", location.method)?;
            writeln!(out, "[调试] 发送给AI的完整消息:\n{}\n", message)?;
        }

        write!(out, "AI回复: ")?;
        out.flush()?;

        let mut write_error: Option<io::Error> = None;
        let mut on_event = |event: &ChatEvent| {
            if write_error.is_none() {
                if let Err(e) = render_event(&mut *out, event) {
                    write_error = Some(e);
                }
            }
        };
        let reply = self.agent.stream_chat(&message, &mut on_event).await;

        if let Some(e) = write_error {
            return Err(e.into());
        }
        let reply = reply?;
        if !reply.is_complete() {
            writeln!(out)?;
        }
        tracing::debug!(
            "Turn finished via {}: {} chars",
            self.agent.name(),
            reply.text.chars().count()
        );
        Ok(reply)
    }

    /// Prompt for lines until an exit word or end of input.
    ///
    /// A failed turn is reported and the loop keeps going.
    pub async fn run_loop<W: Write + Send>(
        &self,
        mut input: impl BufRead,
        out: &mut W,
    ) -> Result<()> {
        loop {
            write!(out, "\n请输入您的问题: ")?;
            out.flush()?;

            let mut line = String::new();
            if input.read_line(&mut line)? == 0 {
                writeln!(out, "\n再见!")?;
                break;
            }

            match LoopInput::classify(&line) {
                LoopInput::Exit => {
                    writeln!(out, "再见!")?;
                    break;
                }
                LoopInput::Empty => {
                    writeln!(out, "请输入有效的问题")?;
                }
                LoopInput::Message(text) => {
                    if let Err(e) = self.turn(text, out).await {
                        tracing::debug!("Chat turn failed: {:#}", e);
                        writeln!(out, "\n发生错误: {}", e)?;
                        writeln!(out, "请重试...")?;
                    }
                }
            }
        }
        Ok(())
    }
}

/// Run interactive chat mode, or a single turn when a message is given
pub async fn run_chat(config: &Config, initial_message: Option<String>) -> Result<()> {
    config.ensure_chat_credentials()?;

    let client = build_http_client()?;
    let resolver = LocationResolver::from_config(config, client);
    let agent = CozeClient::new(&config.chat)?;
    tracing::info!("Using agent bot {}", agent.bot_id());

    let session = ChatSession::new(Box::new(agent), resolver, config.location.method)
        .with_debug(config.debug);
    let mut stdout = io::stdout();

    if let Some(message) = initial_message {
        session.turn(&message, &mut stdout).await?;
        return Ok(());
    }

    ctrlc::set_handler(|| {
        println!("\n\n程序被中断，再见!");
        std::process::exit(0);
    })
    .context("Failed to install Ctrl+C handler")?;

    session.print_banner(&mut stdout).await?;
    let stdin = io::stdin();
    session.run_loop(stdin.lock(), &mut stdout).await
}

/// Resolve and print the current location
pub async fn run_locate(config: &Config, json: bool) -> Result<()> {
    let client = build_http_client()?;
    let resolver = LocationResolver::from_config(config, client);
    tracing::debug!("Strategy chain: {:?}", resolver.strategy_names());

    let location = resolver.resolve().await;
    if json {
        println!("{}", serde_json::to_string_pretty(&location)?);
    } else {
        println!("📍 位置: {} {}", location.region, location.city);
        println!("   坐标: {}, {}", location.latitude, location.longitude);
        println!("   定位方式: {}", location.method);
    }
    Ok(())
}

/// Print public IP, geolocation and local network details
pub async fn run_diagnose(config: &Config) -> Result<()> {
    println!("{}", "🎯 IP地址和位置快速查询工具".bold().cyan());
    println!();

    let client = build_http_client()?;
    let reporter = DiagnosticReporter::new(client, config.endpoints.clone());
    let mut stdout = io::stdout();
    reporter.run(&mut stdout).await?;

    println!("\n🔄 需要重新查询请重新运行程序");
    Ok(())
}

/// Print the device record as JSON; an invalid total is an error
pub fn run_record(device_id: &str, total: &str) -> Result<()> {
    let envelope = record::format_record(device_id, total)?;
    println!("{}", serde_json::to_string_pretty(&envelope)?);
    Ok(())
}

/// Check the agent token and print bot metadata and shortcut commands
pub async fn run_bot(config: &Config) -> Result<()> {
    config.ensure_chat_credentials()?;
    let agent = CozeClient::new(&config.chat)?;

    println!("{}", "=== 测试 Token 有效性 ===".bold().cyan());
    match agent.check_token().await {
        Ok(true) => println!("Token 测试: {}", "✓ 有效".green()),
        Ok(false) => println!("Token 测试: {}", "✗ 无效".red()),
        Err(e) => println!("Token 测试失败: {}", e),
    }

    println!("\n{}", "=== 获取智能体基本信息 ===".bold().cyan());
    match agent.bot_info().await {
        Ok(info) => println!("智能体基本信息: {}", serde_json::to_string_pretty(&info)?),
        Err(e) => println!("获取基本信息失败: {}", e),
    }

    println!("\n{}", "=== 获取智能体在线配置 ===".bold().cyan());
    match agent.online_info().await {
        Ok(info) => {
            println!("在线配置结果: {}", serde_json::to_string_pretty(&info)?);
            for (id, name) in chat::shortcuts(&info) {
                println!("快捷指令ID: {}, 名称: {}", id, name);
            }
        }
        Err(e) => {
            if e.needs_new_token() {
                println!("{}", "Token 已失效，请更新 chat.api_token".yellow());
            }
            println!("获取在线配置失败: {}", e);
        }
    }
    Ok(())
}
