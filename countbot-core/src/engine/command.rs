//! Command-line parsing for the chat verbs.
//!
//! Raw text is split with `shell-words` and mapped onto a [`Command`].
//! Parsing classifies shape only; token resolution and semantics belong
//! to the engine. Verbs are case-insensitive, as are item and variant
//! tokens later on.

use crate::error::CommandError;
use crate::ledger::Count;
use crate::transfer::DropAmount;

/// Which rows a `remove` names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoveSelector {
    /// `remove all` - wipe every row the actor has in the box.
    All,
    /// `remove [item] [variant]` - one row, possibly defaulted.
    One {
        item: Option<String>,
        variant: Option<String>,
    },
}

/// The `collect` subcommands (collector-role gated as a group).
#[derive(Debug, Clone, PartialEq)]
pub enum CollectCommand {
    /// Bare `collect` - show the collection box.
    View,
    Count {
        total: Option<Count>,
        item: Option<String>,
        variant: Option<String>,
    },
    Add {
        amount: Option<Count>,
        item: Option<String>,
        variant: Option<String>,
    },
    Reset {
        item: Option<String>,
        variant: Option<String>,
    },
    Remove {
        selector: RemoveSelector,
    },
    From {
        maker: String,
        amount: Count,
        item: String,
        variant: Option<String>,
    },
}

/// One parsed chat command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Count {
        total: Option<Count>,
        item: Option<String>,
        variant: Option<String>,
    },
    Add {
        amount: Option<Count>,
        item: Option<String>,
        variant: Option<String>,
    },
    Reset {
        item: Option<String>,
        variant: Option<String>,
    },
    Remove {
        selector: RemoveSelector,
    },
    Collect(CollectCommand),
    Drop {
        collector: String,
        amount: DropAmount,
        item: Option<String>,
        variant: Option<String>,
    },
    Confirm {
        maker: Option<String>,
        all: bool,
    },
    Report {
        item: Option<String>,
        variant: Option<String>,
    },
    Who {
        role: Option<String>,
    },
    Sudo {
        actor: String,
        command: Box<Command>,
    },
    Kamikazi {
        pid: u32,
    },
}

/// Parse one raw command line.
pub fn parse(text: &str) -> Result<Command, CommandError> {
    let tokens = shell_words::split(text).map_err(|_| CommandError::BadArgument {
        message: "unbalanced quotes in command".into(),
    })?;
    parse_tokens(&tokens)
}

fn parse_tokens(tokens: &[String]) -> Result<Command, CommandError> {
    let Some((verb, rest)) = tokens.split_first() else {
        return Err(CommandError::BadArgument {
            message: "empty command".into(),
        });
    };

    match verb.to_ascii_lowercase().as_str() {
        "count" => {
            let (total, item, variant) = counted_args(rest)?;
            Ok(Command::Count {
                total,
                item,
                variant,
            })
        }
        "add" => {
            let (amount, item, variant) = counted_args(rest)?;
            Ok(Command::Add {
                amount,
                item,
                variant,
            })
        }
        "reset" => {
            let (item, variant) = name_args(rest)?;
            Ok(Command::Reset { item, variant })
        }
        "remove" => Ok(Command::Remove {
            selector: remove_selector(rest)?,
        }),
        "collect" => Ok(Command::Collect(collect_command(rest)?)),
        "drop" => drop_command(rest),
        "confirm" => confirm_command(rest),
        "report" => {
            let (item, variant) = name_args(rest)?;
            Ok(Command::Report { item, variant })
        }
        "who" => {
            // `who are you` - the filler word is always ignored.
            let rest: Vec<&String> = rest.iter().filter(|t| t.as_str() != "are").collect();
            match rest.as_slice() {
                [] => Ok(Command::Who { role: None }),
                [role] => Ok(Command::Who {
                    role: Some(role.to_string()),
                }),
                _ => Err(too_many(rest.len(), 1)),
            }
        }
        "sudo" => sudo_command(rest),
        "kamikazi" => match rest {
            [pid] => Ok(Command::Kamikazi {
                pid: pid.parse().map_err(|_| CommandError::BadArgument {
                    message: format!("'{pid}' is not a pid"),
                })?,
            }),
            _ => Err(CommandError::BadArgument {
                message: "kamikazi takes exactly one pid".into(),
            }),
        },
        other => Err(CommandError::UnknownCommand {
            verb: other.to_string(),
        }),
    }
}

/// `[n] [item] [variant]` - a leading count, if present, must be numeric.
fn counted_args(
    rest: &[String],
) -> Result<(Option<Count>, Option<String>, Option<String>), CommandError> {
    match rest {
        [] => Ok((None, None, None)),
        [n, names @ ..] => {
            let total = parse_count(n)?;
            let (item, variant) = name_args(names)?;
            Ok((Some(total), item, variant))
        }
    }
}

/// `[item] [variant]`.
fn name_args(rest: &[String]) -> Result<(Option<String>, Option<String>), CommandError> {
    match rest {
        [] => Ok((None, None)),
        [item] => Ok((Some(item.clone()), None)),
        [item, variant] => Ok((Some(item.clone()), Some(variant.clone()))),
        _ => Err(too_many(rest.len(), 2)),
    }
}

fn remove_selector(rest: &[String]) -> Result<RemoveSelector, CommandError> {
    if rest.first().is_some_and(|t| t.eq_ignore_ascii_case("all")) {
        if rest.len() > 1 {
            return Err(too_many(rest.len(), 1));
        }
        return Ok(RemoveSelector::All);
    }
    let (item, variant) = name_args(rest)?;
    Ok(RemoveSelector::One { item, variant })
}

fn collect_command(rest: &[String]) -> Result<CollectCommand, CommandError> {
    let Some((sub, rest)) = rest.split_first() else {
        return Ok(CollectCommand::View);
    };
    match sub.to_ascii_lowercase().as_str() {
        "count" => {
            let (total, item, variant) = counted_args(rest)?;
            Ok(CollectCommand::Count {
                total,
                item,
                variant,
            })
        }
        "add" => {
            let (amount, item, variant) = counted_args(rest)?;
            Ok(CollectCommand::Add {
                amount,
                item,
                variant,
            })
        }
        "reset" => {
            let (item, variant) = name_args(rest)?;
            Ok(CollectCommand::Reset { item, variant })
        }
        "remove" => Ok(CollectCommand::Remove {
            selector: remove_selector(rest)?,
        }),
        "from" => match rest {
            [maker, n, item] => Ok(CollectCommand::From {
                maker: actor_ref(maker),
                amount: parse_count(n)?,
                item: item.clone(),
                variant: None,
            }),
            [maker, n, item, variant] => Ok(CollectCommand::From {
                maker: actor_ref(maker),
                amount: parse_count(n)?,
                item: item.clone(),
                variant: Some(variant.clone()),
            }),
            _ => Err(CommandError::BadArgument {
                message: "collect from needs: maker, count, item, [variant]".into(),
            }),
        },
        other => Err(CommandError::UnknownCommand {
            verb: format!("collect {other}"),
        }),
    }
}

fn drop_command(rest: &[String]) -> Result<Command, CommandError> {
    let [collector, amount, names @ ..] = rest else {
        return Err(CommandError::BadArgument {
            message: "drop needs: collector, count or 'all', [item], [variant]".into(),
        });
    };
    let amount = if amount.eq_ignore_ascii_case("all") {
        DropAmount::All
    } else {
        DropAmount::Count(parse_count(amount)?)
    };
    let (item, variant) = name_args(names)?;
    Ok(Command::Drop {
        collector: actor_ref(collector),
        amount,
        item,
        variant,
    })
}

fn confirm_command(rest: &[String]) -> Result<Command, CommandError> {
    let mut maker = None;
    let mut all = false;
    for token in rest {
        if token.eq_ignore_ascii_case("all") {
            all = true;
        } else if maker.is_none() {
            maker = Some(actor_ref(token));
        } else {
            return Err(too_many(rest.len(), 2));
        }
    }
    Ok(Command::Confirm { maker, all })
}

fn sudo_command(rest: &[String]) -> Result<Command, CommandError> {
    let Some((actor, wrapped)) = rest.split_first() else {
        return Err(CommandError::BadArgument {
            message: "sudo needs: actor, command".into(),
        });
    };
    let command = parse_tokens(wrapped)?;
    match command {
        Command::Count { .. }
        | Command::Add { .. }
        | Command::Reset { .. }
        | Command::Remove { .. }
        | Command::Collect(_)
        | Command::Drop { .. }
        | Command::Confirm { .. } => Ok(Command::Sudo {
            actor: actor_ref(actor),
            command: Box::new(command),
        }),
        _ => Err(CommandError::BadArgument {
            message: "that command is not supported under sudo".into(),
        }),
    }
}

fn too_many(given: usize, max: usize) -> CommandError {
    CommandError::BadArgument {
        message: format!("too many arguments (got {given}, at most {max} expected)"),
    }
}

fn parse_count(token: &str) -> Result<Count, CommandError> {
    token.parse().map_err(|_| CommandError::BadArgument {
        message: format!("'{token}' is not a number"),
    })
}

/// Normalize an actor reference: `@name`, `<@123>` and `<@!123>` mention
/// forms all reduce to the bare identity.
fn actor_ref(token: &str) -> String {
    token
        .trim_start_matches("<@")
        .trim_start_matches('!')
        .trim_end_matches('>')
        .trim_start_matches('@')
        .to_string()
}
