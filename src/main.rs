use crossterm::{
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use std::io;
use tracing::{error, info};

use heartlink::config::{self, Config};
use heartlink::debug;
use heartlink::game_modes::run_session;
use heartlink::menu::{self, AppState, MenuAction, MenuState};
use heartlink::network::SessionMode;

struct Args {
    debug: bool,
    session: Option<SessionMode>,
}

fn main() -> Result<(), io::Error> {
    let argv: Vec<String> = std::env::args().collect();
    let args = parse_args(&argv);

    debug::init(args.debug)?;
    info!("heartlink starting");

    let config = config::load_config()?;

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = run_app(&mut terminal, &config, args.session);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    if let Err(ref e) = result {
        error!("Exited with error: {}", e);
    }
    result
}

fn run_app<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    config: &Config,
    initial: Option<SessionMode>,
) -> Result<(), io::Error> {
    let mut menu_state = MenuState::new(&config.player.name);
    let mut app_state = match initial {
        Some(mode) => AppState::Session(mode),
        None => AppState::Menu,
    };

    loop {
        app_state = match app_state {
            AppState::Menu => {
                terminal.draw(|f| menu::render_menu(f, &menu_state))?;
                match menu::handle_menu_input(&mut menu_state, &config.keybindings)? {
                    MenuAction::None => AppState::Menu,
                    MenuAction::StartSession(mode) => AppState::Session(mode),
                    MenuAction::Quit => AppState::Exiting,
                }
            }
            AppState::Session(mode) => {
                if let Err(e) = run_session(terminal, config, mode) {
                    error!("Session ended with error: {}", e);
                    menu_state.notice = Some(format!("Session ended: {}", e));
                }
                AppState::Menu
            }
            AppState::Exiting => return Ok(()),
        };
    }
}

/// Parse command line arguments; `--help` and bad input exit here
fn parse_args(argv: &[String]) -> Args {
    let program = argv.first().map(String::as_str).unwrap_or("heartlink");
    let mut args = Args {
        debug: false,
        session: None,
    };

    let mut rest = argv.iter().skip(1);
    while let Some(arg) = rest.next() {
        match arg.as_str() {
            "--debug" | "-d" => args.debug = true,
            "--host" => match rest.next() {
                Some(name) => args.session = Some(SessionMode::Host { name: name.clone() }),
                None => usage_error(program, "--host requires a name"),
            },
            "--join" => match (rest.next(), rest.next()) {
                (Some(code), Some(name)) => {
                    args.session = Some(SessionMode::Join {
                        code: code.clone(),
                        name: name.clone(),
                    })
                }
                _ => usage_error(program, "--join requires a game code and a name"),
            },
            "--help" | "-h" => {
                print_usage(program);
                std::process::exit(0);
            }
            other => usage_error(program, &format!("Unknown argument: {}", other)),
        }
    }

    args
}

fn usage_error(program: &str, message: &str) -> ! {
    eprintln!("Error: {}", message);
    print_usage(program);
    std::process::exit(1);
}

fn print_usage(program: &str) {
    println!("heartlink - peer-to-peer tic-tac-toe for two");
    println!();
    println!("Usage:");
    println!("  {}                          # Open the menu", program);
    println!("  {} --host <name>            # Host a game and get a code", program);
    println!("  {} --join <CODE> <name>     # Join a game by code", program);
    println!();
    println!("Options:");
    println!("  --debug    Write a log to {}", debug::LOG_FILE_PATH);
    println!();
    println!("Settings live in {}", config::get_config_path().display());
    println!("If the rendezvous server is unreachable the game offers copy/paste exchange instead.");
}
