use std::io::{self, BufRead};

use clap::Parser;
use portal_api::auth::password;

#[derive(Parser)]
#[command(name = "hash-password")]
#[command(about = "Hash a password read from stdin for users[].password_hash", long_about = None)]
struct Cli {
    /// Check the password against this digest instead of hashing it
    #[arg(long, value_name = "DIGEST")]
    verify: Option<String>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    let plaintext = line.trim_end_matches(['\r', '\n']);
    if plaintext.is_empty() {
        return Err("no password on stdin".into());
    }

    match cli.verify {
        Some(digest) => {
            if password::verify(plaintext, &digest)? {
                println!("match");
            } else {
                println!("no match");
                std::process::exit(1);
            }
        }
        None => println!("{}", password::hash(plaintext)?),
    }
    Ok(())
}
