//! The interactive command loop: one `Node`, one terminal, same as the
//! original desktop app's single-session model. Every mutating command
//! saves the snapshot to disk afterward and broadcasts whatever new object
//! it produced, matching spec.md's data flow: "user actions enter the Node
//! engine, which mutates Accounts/Ledger/Pool, asks Persistence to
//! snapshot, and publishes the resulting objects through the Gossip layer."

use std::collections::BTreeSet;
use std::sync::Arc;

use ferrochain_core::node::Node;
use ferrochain_network::{GossipHandle, GossipObject};
use ferrochain_persistence::Store;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::Mutex;

use crate::commands::{self, Command};

pub async fn run(node: Arc<Mutex<Node>>, store: Store, gossip: Option<GossipHandle>) {
    println!("{}", commands::HELP_TEXT);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("> ");
        use std::io::Write;
        let _ = std::io::stdout().flush();

        let Ok(Some(line)) = lines.next_line().await else {
            break;
        };
        match commands::parse(&line) {
            Command::Empty => {}
            Command::Quit => break,
            Command::Help => println!("{}", commands::HELP_TEXT),
            cmd => handle(&node, &store, &gossip, cmd).await,
        }
    }
}

async fn handle(node: &Arc<Mutex<Node>>, store: &Store, gossip: &Option<GossipHandle>, cmd: Command) {
    let mut broadcasts: Vec<GossipObject> = Vec::new();
    let mut persist = false;

    {
        let mut node = node.lock().await;
        match cmd {
            Command::Register { username, password } => {
                let pool_before: BTreeSet<String> = node.pool().snapshot().into_keys().collect();
                match node.register(&username, &password) {
                    Ok(outcome) => {
                        println!("{outcome:?}");
                        if let Some(user) = node.accounts().get_user(&username) {
                            broadcasts.push(GossipObject::User(user.clone()));
                        }
                        broadcasts.extend(new_pool_txs(&node, &pool_before));
                        persist = true;
                    }
                    Err(e) => println!("error: {e}"),
                }
            }
            Command::Login { username, password } => match node.login(&username, &password) {
                Ok(outcome) => {
                    println!("{outcome:?}");
                    persist = true;
                }
                Err(e) => println!("error: {e}"),
            },
            Command::Logout => {
                node.logout();
                println!("logged out");
            }
            Command::CreateTx { output, fee, receiver } => {
                let Some(receiver_pk) = node.accounts().get_user(&receiver).map(|u| u.pub_key.clone()) else {
                    println!("error: unknown user '{receiver}'");
                    return;
                };
                let pool_before: BTreeSet<String> = node.pool().snapshot().into_keys().collect();
                match node.create_tx(output, fee, receiver_pk) {
                    Ok(outcome) => {
                        println!("{outcome:?}");
                        broadcasts.extend(new_pool_txs(&node, &pool_before));
                        persist = true;
                    }
                    Err(e) => println!("error: {e}"),
                }
            }
            Command::CancelTx { hash } => match node.cancel_tx(&hash) {
                Ok(outcome) => {
                    println!("{outcome:?}");
                    persist = true;
                }
                Err(e) => println!("error: {e}"),
            },
            Command::Mine => {
                let tip_id = node.chain().len() as u64 - 1;
                match node.mine() {
                    Ok(outcome) => {
                        println!("{outcome:?}");
                        if let Some(block) = node.chain().get_by_id(tip_id) {
                            broadcasts.push(GossipObject::Block(block.clone()));
                        }
                        persist = true;
                    }
                    Err(e) => println!("error: {e}"),
                }
            }
            Command::Validate { block_id, accept } => {
                let session_pk = node
                    .current_user()
                    .and_then(|u| node.accounts().get_user(u))
                    .map(|u| u.pub_key.clone());
                let pool_before: BTreeSet<String> = node.pool().snapshot().into_keys().collect();
                match node.validate(block_id, accept) {
                    Ok(outcome) => {
                        println!("{outcome:?}");
                        if let (Some(pk), Some(block)) = (session_pk, node.chain().get_by_id(block_id)) {
                            if let Some(flag) = block.validation_flags.iter().find(|f| f.validator_pk == pk) {
                                broadcasts.push(GossipObject::ValidationFlag(flag.clone()));
                            }
                        }
                        broadcasts.extend(new_pool_txs(&node, &pool_before));
                        persist = true;
                    }
                    Err(e) => println!("error: {e}"),
                }
            }
            Command::Wallet => match node.wallet_view() {
                Ok(view) => println!(
                    "incoming {} outgoing {} reserved {} fees {} available {}",
                    view.incoming, view.outgoing, view.reserved, view.fees, view.available
                ),
                Err(e) => println!("error: {e}"),
            },
            Command::Status => {
                println!(
                    "blocks: {} | pooled txs: {} | known accounts: {} | logged in: {}",
                    node.chain().len(),
                    node.pool().len(),
                    node.accounts().len(),
                    node.current_user().unwrap_or("<none>")
                );
            }
            Command::Users => {
                for username in node.accounts().snapshot().keys() {
                    println!("{username}");
                }
            }
            Command::Unknown(line) => println!("unrecognized command: '{line}' (try 'help')"),
            Command::Empty | Command::Help | Command::Quit => unreachable!("handled by caller"),
        }
    }

    if persist {
        let node = node.lock().await;
        if let Err(e) = store.save(node.accounts(), node.chain(), node.pool()) {
            log::warn!("failed to persist state: {e}");
        }
    }
    if let Some(gossip) = gossip {
        for obj in broadcasts {
            gossip.broadcast(obj).await;
        }
    }
}

fn new_pool_txs(node: &Node, before: &BTreeSet<String>) -> Vec<GossipObject> {
    node.pool()
        .snapshot()
        .into_iter()
        .filter(|(hash, _)| !before.contains(hash))
        .map(|(_, tx)| GossipObject::Tx(tx))
        .collect()
}
