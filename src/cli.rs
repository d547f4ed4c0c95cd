use crate::activity::ActivityLog;
use crate::api::types::{Dog, GeoBoundingBox, LocationSearchParams, SortDirection, SortField};
use crate::api::ApiClient;
use crate::browse::{BrowseError, Browser};
use crate::navigation::{CliNavigator, Navigator, Route};
use crate::session::{
    LogoutReason, SessionError, SessionStore, TimerEvent, TimerOutcome, WarningChoice,
    WarningDialog,
};
use anyhow::Result;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::rc::Rc;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;

/// Everything the REPL thread reacts to
#[derive(Debug)]
pub enum AppEvent {
    Line(String),
    Timer(TimerEvent),
    Eof,
}

impl From<TimerEvent> for AppEvent {
    fn from(event: TimerEvent) -> Self {
        Self::Timer(event)
    }
}

pub struct Context {
    pub session: SessionStore,
    pub browser: Browser<Rc<ApiClient>>,
    pub warning: WarningDialog,
    pub navigator: CliNavigator,
    pub activity: Option<ActivityLog>,
}

impl Context {
    fn record(&mut self, f: impl FnOnce(&mut ActivityLog) -> Result<()>) {
        if let Some(log) = self.activity.as_mut() {
            if let Err(e) = f(log) {
                tracing::warn!("failed to write activity log: {:#}", e);
            }
        }
    }

    fn prompt(&self) -> String {
        if self.warning.is_open() {
            return "[continue/logout] > ".to_string();
        }
        match self.navigator.current() {
            Route::Login => "login> ".to_string(),
            Route::Search => format!("search p{}> ", self.browser.filters.page()),
        }
    }
}

/// Read stdin on its own thread. Each line is forwarded as an event and the
/// reader waits for the next prompt before reading again, so output for one
/// line is finished before the next prompt appears.
fn spawn_reader(events: Sender<AppEvent>, prompts: Receiver<String>) {
    thread::spawn(move || {
        let mut rl = match DefaultEditor::new() {
            Ok(rl) => rl,
            Err(e) => {
                eprintln!("Input error: {}", e);
                let _ = events.send(AppEvent::Eof);
                return;
            }
        };

        while let Ok(prompt) = prompts.recv() {
            match rl.readline(&prompt) {
                Ok(line) => {
                    let line = line.trim().to_string();
                    if !line.is_empty() {
                        let _ = rl.add_history_entry(line.as_str());
                    }
                    if events.send(AppEvent::Line(line)).is_err() {
                        break;
                    }
                }
                Err(ReadlineError::Interrupted | ReadlineError::Eof) => {
                    let _ = events.send(AppEvent::Eof);
                    break;
                }
                Err(e) => {
                    eprintln!("Input error: {}", e);
                    let _ = events.send(AppEvent::Eof);
                    break;
                }
            }
        }
    });
}

pub fn run_repl(
    mut ctx: Context,
    events_tx: Sender<AppEvent>,
    events: Receiver<AppEvent>,
) -> Result<()> {
    let (prompt_tx, prompt_rx) = mpsc::channel();
    spawn_reader(events_tx, prompt_rx);

    println!("pawfinder - type /help for commands, /exit to quit");
    if ctx.session.is_authenticated() {
        ctx.navigator.go_to(Route::Search);
        run_search(&mut ctx);
    } else {
        ctx.navigator.go_to(Route::Login);
        println!("Log in with /login <name> <email>");
    }
    let _ = prompt_tx.send(ctx.prompt());

    for event in events {
        match event {
            AppEvent::Timer(timer) => handle_timer(&mut ctx, timer),
            AppEvent::Line(line) => {
                if handle_line(&mut ctx, &line) {
                    break;
                }
                if prompt_tx.send(ctx.prompt()).is_err() {
                    break;
                }
            }
            AppEvent::Eof => break,
        }
    }

    ctx.warning.close();
    Ok(())
}

fn handle_timer(ctx: &mut Context, timer: TimerEvent) {
    match ctx.session.handle_timer(timer) {
        TimerOutcome::Warned => {
            if ctx.warning.poll() {
                println!();
                println!("Your session will expire in 10 minutes.");
                println!("Stay logged in? Type 'continue' or 'logout'.");
            }
        }
        TimerOutcome::Expired => {
            ctx.warning.dismiss();
            ctx.browser.reset();
            ctx.record(|log| log.logout(LogoutReason::Expired.as_str()));
            println!();
            println!("Session expired. Log in again with /login <name> <email>");
        }
        TimerOutcome::Ignored => {}
    }
}

/// Returns true when the REPL should exit
fn handle_line(ctx: &mut Context, line: &str) -> bool {
    if ctx.warning.is_open() {
        answer_warning(ctx, line);
        return false;
    }
    if line.is_empty() {
        return false;
    }
    if !line.starts_with('/') {
        println!("Commands start with '/'. Type /help for a list.");
        return false;
    }

    let parts = match shell_words::split(line) {
        Ok(parts) => parts,
        Err(e) => {
            println!("Could not parse command: {}", e);
            return false;
        }
    };
    let args: Vec<&str> = parts.iter().skip(1).map(|s| s.as_str()).collect();
    handle_command(ctx, parts[0].as_str(), &args)
}

fn answer_warning(ctx: &mut Context, line: &str) {
    let Some(choice) = WarningChoice::parse(line) else {
        println!("Please answer 'continue' or 'logout'.");
        return;
    };
    if ctx.warning.respond(choice, &mut ctx.session) {
        ctx.browser.reset();
        ctx.record(|log| log.logout(LogoutReason::Warning.as_str()));
        println!("Logged out.");
    } else if choice == WarningChoice::Continue {
        println!("Still logged in. The session ends on schedule.");
    }
}

fn handle_command(ctx: &mut Context, cmd: &str, args: &[&str]) -> bool {
    match cmd {
        "/exit" | "/quit" => return true,
        "/help" => print_help(),
        "/login" => handle_login(ctx, args),
        "/logout" => {
            if ctx.session.logout(LogoutReason::User) {
                ctx.browser.reset();
                ctx.record(|log| log.logout(LogoutReason::User.as_str()));
                println!("Logged out.");
            } else {
                println!("Not logged in.");
            }
        }
        "/status" => print_status(ctx),
        _ => {
            if !require_session(ctx) {
                return false;
            }
            handle_catalog_command(ctx, cmd, args);
        }
    }
    false
}

fn print_help() {
    println!("Session:");
    println!("  /login <name> <email>      - log in");
    println!("  /logout                    - log out");
    println!("  /status                    - session and filter summary");
    println!("  /exit                      - quit");
    println!("Filters (reset to page 1):");
    println!("  /breeds                    - list known breeds");
    println!("  /breed add|rm <breed>      - filter by breed (quote names with spaces)");
    println!("  /breed clear               - drop the breed filter");
    println!("  /zip <zip>[, <zip>...]     - filter by zip codes (empty to clear)");
    println!("  /age <min> <max>           - filter by age range");
    println!("  /sort [breed|name|age] asc|desc");
    println!("Results:");
    println!("  /search                    - run the search");
    println!("  /next, /prev, /page <n>    - move between pages");
    println!("  /fav <#|id>                - toggle a favorite by list number or id");
    println!("  /favs                      - show favorites");
    println!("  /match                     - find your match among favorites");
    println!("  /where <city> [STATE...]   - look up locations");
}

fn handle_login(ctx: &mut Context, args: &[&str]) {
    let (name, email) = match args {
        [name, email] if !name.trim().is_empty() && !email.trim().is_empty() => {
            (name.trim(), email.trim())
        }
        _ => {
            println!("Name and email are required: /login <name> <email>");
            return;
        }
    };

    match ctx.session.login(name, email) {
        Ok(()) => {
            ctx.browser.reset();
            let login_ts = ctx.session.login_timestamp().unwrap_or_default();
            ctx.record(|log| log.login(name, login_ts));
            println!("Welcome, {}!", name);
            run_search(ctx);
        }
        Err(e) => {
            let message = e.to_string();
            ctx.record(|log| log.login_failed(name, &message));
            match e {
                SessionError::AuthRejected(_) => println!("{}. Please try again.", message),
                SessionError::Storage(_) => eprintln!("Error: {}", message),
            }
        }
    }
}

fn print_status(ctx: &Context) {
    println!("Surface: {}", ctx.navigator.current().path());
    match ctx.session.remaining() {
        Some(ms) if ctx.session.is_authenticated() => {
            println!("Session: active, {} remaining", format_remaining(ms));
        }
        _ => println!("Session: logged out"),
    }
    let filters = &ctx.browser.filters;
    let (age_min, age_max) = filters.age_range();
    let (field, dir) = filters.sort();
    println!(
        "Breeds: {}",
        if filters.breeds().is_empty() {
            "any".to_string()
        } else {
            filters.breeds().join(", ")
        }
    );
    println!(
        "Zip codes: {}",
        if filters.zip_codes().is_empty() {
            "any".to_string()
        } else {
            filters.zip_codes().join(", ")
        }
    );
    println!("Age: {} - {}", age_min, age_max);
    println!("Sort: {} {}", field.as_str(), dir.as_str());
    println!(
        "Page: {} of {}",
        filters.page(),
        ctx.browser.page_count().max(1)
    );
    println!("Favorites: {}", ctx.browser.favorites.len());
}

fn require_session(ctx: &mut Context) -> bool {
    if ctx.session.is_authenticated() {
        return true;
    }
    ctx.navigator.go_to(Route::Login);
    println!("Please log in first: /login <name> <email>");
    false
}

fn handle_catalog_command(ctx: &mut Context, cmd: &str, args: &[&str]) {
    match cmd {
        "/breeds" => match ctx.browser.breeds() {
            Ok(breeds) => {
                println!("{} breeds:", breeds.len());
                for chunk in breeds.chunks(4) {
                    println!("  {}", chunk.join(" | "));
                }
            }
            Err(e) => report(ctx, e),
        },
        "/breed" => match args {
            ["add", breed] => {
                if ctx.browser.filters.add_breed(breed) {
                    run_search(ctx);
                } else {
                    println!("Already filtering by {}", breed);
                }
            }
            ["rm", breed] => {
                if ctx.browser.filters.remove_breed(breed) {
                    run_search(ctx);
                } else {
                    println!("Not filtering by {}", breed);
                }
            }
            ["clear"] => {
                ctx.browser.filters.clear_breeds();
                run_search(ctx);
            }
            _ => println!("Usage: /breed add|rm <breed>  or  /breed clear"),
        },
        "/zip" => {
            ctx.browser.filters.set_zip_input(&args.join(" "));
            run_search(ctx);
        }
        "/age" => match args {
            [min, max] => match (min.parse::<u32>(), max.parse::<u32>()) {
                (Ok(min), Ok(max)) => match ctx.browser.filters.set_age_range(min, max) {
                    Ok(()) => run_search(ctx),
                    Err(e) => println!("{}", e),
                },
                _ => println!("Ages must be whole numbers"),
            },
            _ => println!("Usage: /age <min> <max>"),
        },
        "/sort" => {
            let parsed = match args {
                [dir] => dir.parse::<SortDirection>().map(|d| (SortField::Breed, d)),
                [field, dir] => field
                    .parse::<SortField>()
                    .and_then(|f| Ok((f, dir.parse::<SortDirection>()?))),
                _ => Err("Usage: /sort [breed|name|age] asc|desc".to_string()),
            };
            match parsed {
                Ok((field, dir)) => {
                    ctx.browser.filters.set_sort(field, dir);
                    run_search(ctx);
                }
                Err(e) => println!("{}", e),
            }
        }
        "/search" => run_search(ctx),
        "/next" => {
            if ctx.browser.next_page() {
                run_search(ctx);
            } else {
                println!("Already on the last page");
            }
        }
        "/prev" => {
            if ctx.browser.prev_page() {
                run_search(ctx);
            } else {
                println!("Already on the first page");
            }
        }
        "/page" => match args.first().map(|p| p.parse::<u32>()) {
            Some(Ok(page)) => {
                ctx.browser.go_to_page(page);
                run_search(ctx);
            }
            _ => println!("Usage: /page <n>"),
        },
        "/fav" => match args.first() {
            Some(target) => toggle_favorite(ctx, target),
            None => println!("Usage: /fav <#|id>"),
        },
        "/favs" => match ctx.browser.favorite_dogs() {
            Ok(dogs) if dogs.is_empty() => println!("No favorites selected."),
            Ok(dogs) => {
                println!("Favorites:");
                for dog in &dogs {
                    println!("  {}", describe(dog));
                }
            }
            Err(e) => report(ctx, e),
        },
        "/match" => match ctx.browser.find_match() {
            Ok(dog) => {
                let favorites = ctx.browser.favorites.len();
                ctx.record(|log| log.matched(favorites, &dog.id));
                println!("Your match:");
                println!("  {}", describe(&dog));
                println!("  {}", dog.img);
            }
            Err(e) => report(ctx, e),
        },
        "/where" => {
            let Some(params) = parse_where(args) else {
                println!("Usage: /where <city> [STATE...]");
                println!("       /where box <top> <left> <bottom> <right>");
                return;
            };
            match ctx.browser.search_locations(&params) {
                Ok((locations, total)) => {
                    println!("{} location(s)", total);
                    for loc in locations {
                        println!(
                            "  {} {}, {} ({})",
                            loc.zip_code, loc.city, loc.state, loc.county
                        );
                    }
                }
                Err(e) => report(ctx, e),
            }
        }
        _ => println!("Unknown command: {}", cmd),
    }
}

fn parse_where(args: &[&str]) -> Option<LocationSearchParams> {
    match args {
        ["box", top, left, bottom, right] => Some(LocationSearchParams {
            geo_bounding_box: Some(GeoBoundingBox::Edges {
                top: top.parse().ok()?,
                left: left.parse().ok()?,
                bottom: bottom.parse().ok()?,
                right: right.parse().ok()?,
            }),
            ..Default::default()
        }),
        ["box", ..] | [] => None,
        [city, states @ ..] => Some(LocationSearchParams {
            city: Some(city.to_string()),
            states: if states.is_empty() {
                None
            } else {
                Some(states.iter().map(|s| s.to_uppercase()).collect())
            },
            ..Default::default()
        }),
    }
}

fn toggle_favorite(ctx: &mut Context, target: &str) {
    // A small number refers to the list on screen, anything else is an id
    let id = match target.parse::<usize>() {
        Ok(n) if n >= 1 && n <= ctx.browser.results().dogs.len() => {
            ctx.browser.results().dogs[n - 1].id.clone()
        }
        _ => target.to_string(),
    };
    if ctx.browser.favorites.toggle(&id) {
        println!("★ added {} ({} favorites)", id, ctx.browser.favorites.len());
    } else {
        println!("☆ removed {} ({} favorites)", id, ctx.browser.favorites.len());
    }
}

fn run_search(ctx: &mut Context) {
    let page = ctx.browser.filters.page();
    match ctx.browser.refresh() {
        Ok(results) => {
            let total = results.total;
            let shown = results.dogs.len();
            render_results(ctx);
            ctx.record(|log| log.search(page, total, shown));
        }
        Err(e) => {
            println!("Failed to fetch dogs. Please try again later.");
            report(ctx, e);
        }
    }
}

fn render_results(ctx: &Context) {
    let results = ctx.browser.results();
    if results.dogs.is_empty() {
        println!("No dogs match these filters.");
        return;
    }
    for (i, dog) in results.dogs.iter().enumerate() {
        let star = if ctx.browser.favorites.contains(&dog.id) {
            "★"
        } else {
            " "
        };
        let place = results
            .locations
            .get(&dog.zip_code)
            .map(|loc| format!("{}, {} {}", loc.city, loc.state, loc.zip_code))
            .unwrap_or_else(|| dog.zip_code.clone());
        println!("{:>3}. {} {} - {}", i + 1, star, describe(dog), place);
    }
    println!(
        "Page {} of {} ({} dogs)",
        ctx.browser.filters.page(),
        ctx.browser.page_count().max(1),
        results.total
    );
}

fn describe(dog: &Dog) -> String {
    format!("{} ({}, {} yr) [{}]", dog.name, dog.breed, dog.age, dog.id)
}

fn report(ctx: &mut Context, err: BrowseError) {
    // The server no longer accepts our credential: treat it as an expired session
    if let BrowseError::Api(api) = &err {
        if api.is_unauthorized() {
            eprintln!("Error: {}", err);
            if ctx.session.logout(LogoutReason::Expired) {
                ctx.browser.reset();
                ctx.record(|log| log.logout(LogoutReason::Expired.as_str()));
            }
            println!("Your session is no longer valid. Please log in again.");
            return;
        }
    }
    eprintln!("Error: {}", err);
}

fn format_remaining(ms: i64) -> String {
    let secs = ms / 1000;
    format!("{}m {:02}s", secs / 60, secs % 60)
}
