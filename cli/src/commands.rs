//! Parses one REPL line into a [`Command`].

use ferrochain_core::amount::Amount;

pub enum Command {
    Register { username: String, password: String },
    Login { username: String, password: String },
    Logout,
    CreateTx { output: Amount, fee: Amount, receiver: String },
    CancelTx { hash: String },
    Mine,
    Validate { block_id: u64, accept: bool },
    Wallet,
    Status,
    Users,
    Help,
    Quit,
    Unknown(String),
    Empty,
}

/// Parses `"1.5"` into `1_500_000` micro-units. No fractional digit beyond
/// six is meaningful since that is `Amount`'s own scale.
fn parse_amount(s: &str) -> Option<Amount> {
    let (whole, frac) = match s.split_once('.') {
        Some((w, f)) => (w, f),
        None => (s, ""),
    };
    let whole: u64 = whole.parse().ok()?;
    let mut frac_digits = frac.to_string();
    while frac_digits.len() < 6 {
        frac_digits.push('0');
    }
    frac_digits.truncate(6);
    let frac: u64 = frac_digits.parse().ok()?;
    Some(Amount::from_whole(whole) + Amount::from_micros(frac))
}

pub fn parse(line: &str) -> Command {
    let parts: Vec<&str> = line.split_whitespace().collect();
    match parts.as_slice() {
        [] => Command::Empty,
        ["register", user, pass] => Command::Register {
            username: user.to_string(),
            password: pass.to_string(),
        },
        ["login", user, pass] => Command::Login {
            username: user.to_string(),
            password: pass.to_string(),
        },
        ["logout"] => Command::Logout,
        ["tx", output, fee, receiver] => match (parse_amount(output), parse_amount(fee)) {
            (Some(output), Some(fee)) => Command::CreateTx {
                output,
                fee,
                receiver: receiver.to_string(),
            },
            _ => Command::Unknown(line.to_string()),
        },
        ["cancel", hash] => Command::CancelTx { hash: hash.to_string() },
        ["mine"] => Command::Mine,
        ["validate", id, verdict] => match (id.parse().ok(), parse_accept(verdict)) {
            (Some(block_id), Some(accept)) => Command::Validate { block_id, accept },
            _ => Command::Unknown(line.to_string()),
        },
        ["wallet"] => Command::Wallet,
        ["status"] => Command::Status,
        ["users"] => Command::Users,
        ["help"] => Command::Help,
        ["quit"] | ["exit"] => Command::Quit,
        _ => Command::Unknown(line.to_string()),
    }
}

fn parse_accept(s: &str) -> Option<bool> {
    match s {
        "accept" | "yes" | "true" => Some(true),
        "reject" | "no" | "false" => Some(false),
        _ => None,
    }
}

pub const HELP_TEXT: &str = "\
commands:
  register <username> <password>
  login <username> <password>
  logout
  tx <output> <fee> <receiver-username>
  cancel <tx-hash>
  mine
  validate <block-id> <accept|reject>
  wallet
  status
  users
  help
  quit";
