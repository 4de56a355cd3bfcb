use std::env;
use std::process::ExitCode;

use attach_flow_view::{
    AttachmentFrame, AttachmentView, DisplayOptions, GridHost, Insets, MaterializationPolicy, Rect,
};
use serde::Serialize;

const DEFAULT_WIDTH: f32 = 360.0;
const DEFAULT_ADVANCE: f32 = 8.0;
const DEFAULT_LINE_HEIGHT: f32 = 18.0;

#[derive(Clone, Debug)]
struct Args {
    markup_path: String,
    width: f32,
    advance: f32,
    line_height: f32,
    inset: f32,
    max_count: Option<usize>,
    viewport_height: Option<f32>,
    reveal: bool,
    pretty: bool,
}

#[derive(Debug, Serialize)]
struct AttachmentReport {
    id: String,
    kind: &'static str,
    source: String,
    alignment: &'static str,
    link: Option<String>,
    declared: [f32; 2],
    max: [f32; 2],
    state: String,
}

#[derive(Debug, Serialize)]
struct PreviewReport {
    width: f32,
    content_height: f32,
    layout_passes: usize,
    attachments: Vec<AttachmentReport>,
    frames: Vec<AttachmentFrame>,
    pending: Vec<String>,
    diagnostics: Vec<String>,
}

fn main() -> ExitCode {
    match run(env::args().collect()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(msg) => {
            eprintln!("error: {}", msg);
            eprintln!("{}", help_text());
            ExitCode::FAILURE
        }
    }
}

fn run(args: Vec<String>) -> Result<(), String> {
    let cli = parse_args(args)?;
    let markup = std::fs::read_to_string(&cli.markup_path)
        .map_err(|e| format!("{}: {}", cli.markup_path, e))?;

    let policy = match (cli.viewport_height, cli.max_count) {
        (Some(height), _) => MaterializationPolicy::Viewport(Rect::new(0.0, 0.0, cli.width, height)),
        (None, Some(max)) => MaterializationPolicy::MaxCount(max),
        (None, None) => MaterializationPolicy::Unbounded,
    };
    let options = DisplayOptions {
        policy,
        ..DisplayOptions::default()
    };
    let host = GridHost::new(cli.width, cli.advance, cli.line_height)
        .with_insets(Insets::uniform(cli.inset));
    let mut view = AttachmentView::new(host, options);

    let diagnostics = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
    let sink = diagnostics.clone();
    view.set_diagnostic_sink(move |diagnostic| {
        if let Ok(mut out) = sink.lock() {
            out.push(format!("{:?}", diagnostic));
        }
    });

    view.display(markup);
    view.wait_for_content().map_err(|e| e.to_string())?;
    if cli.reveal {
        view.reveal_remaining();
    }

    let attachments = view
        .attachments()
        .iter()
        .map(|attachment| AttachmentReport {
            id: attachment.id().label().to_string(),
            kind: attachment.kind().name(),
            source: attachment.source_url().to_string(),
            alignment: attachment.alignment().as_str(),
            link: attachment.link().map(str::to_string),
            declared: [attachment.declared_size().width, attachment.declared_size().height],
            max: [attachment.max_size().width, attachment.max_size().height],
            state: view
                .state(attachment.id())
                .map(|state| format!("{:?}", state))
                .unwrap_or_default(),
        })
        .collect();
    let report = PreviewReport {
        width: cli.width,
        content_height: view.host().content_height(),
        layout_passes: view.layout_passes(),
        attachments,
        frames: view.frames(),
        pending: view.pending().iter().map(|id| id.label().to_string()).collect(),
        diagnostics: diagnostics.lock().map(|d| d.clone()).unwrap_or_default(),
    };

    let json = if cli.pretty {
        serde_json::to_string_pretty(&report)
    } else {
        serde_json::to_string(&report)
    }
    .map_err(|e| e.to_string())?;
    println!("{}", json);
    Ok(())
}

fn parse_args(args: Vec<String>) -> Result<Args, String> {
    if args.len() >= 2 && (args[1] == "--help" || args[1] == "-h") {
        return Err("help requested".to_string());
    }
    let markup_path = args
        .get(1)
        .filter(|v| !v.starts_with("--"))
        .cloned()
        .ok_or_else(|| "missing markup file".to_string())?;

    let mut cfg = Args {
        markup_path,
        width: DEFAULT_WIDTH,
        advance: DEFAULT_ADVANCE,
        line_height: DEFAULT_LINE_HEIGHT,
        inset: 0.0,
        max_count: None,
        viewport_height: None,
        reveal: false,
        pretty: false,
    };

    let mut i = 2usize;
    while i < args.len() {
        match args[i].as_str() {
            "--width" => {
                cfg.width = parse_value(&args, i)?;
                i += 2;
            }
            "--advance" => {
                cfg.advance = parse_value(&args, i)?;
                i += 2;
            }
            "--line-height" => {
                cfg.line_height = parse_value(&args, i)?;
                i += 2;
            }
            "--inset" => {
                cfg.inset = parse_value(&args, i)?;
                i += 2;
            }
            "--max-count" => {
                cfg.max_count = Some(parse_value(&args, i)?);
                i += 2;
            }
            "--viewport" => {
                cfg.viewport_height = Some(parse_value(&args, i)?);
                i += 2;
            }
            "--reveal" => {
                cfg.reveal = true;
                i += 1;
            }
            "--pretty" => {
                cfg.pretty = true;
                i += 1;
            }
            other => return Err(format!("unknown argument: {}", other)),
        }
    }
    if cfg.width <= 0.0 || cfg.advance <= 0.0 || cfg.line_height <= 0.0 {
        return Err("--width, --advance and --line-height must be positive".to_string());
    }
    Ok(cfg)
}

fn parse_value<T: std::str::FromStr>(args: &[String], i: usize) -> Result<T, String> {
    let flag = &args[i];
    let raw = args
        .get(i + 1)
        .ok_or_else(|| format!("{} requires a value", flag))?;
    raw.parse::<T>()
        .map_err(|_| format!("invalid value for {}: {}", flag, raw))
}

fn help_text() -> &'static str {
    "usage: attach-preview <markup.html> [--width N] [--advance N] [--line-height N] \
[--inset N] [--max-count N | --viewport HEIGHT] [--reveal] [--pretty]"
}
