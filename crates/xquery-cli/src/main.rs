use owo_colors::{OwoColorize, Stream};

fn main() {
    if let Err(error) = platynui_xquery_cli::run() {
        let message = format!("{error:#}");
        eprintln!("{}", message.if_supports_color(Stream::Stderr, |text| text.red().to_string()));
        std::process::exit(1);
    }
}
