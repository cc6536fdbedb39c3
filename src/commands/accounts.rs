//! `uget accounts`: add, list, enable and disable provider accounts.

use anyhow::Result;

use uget::accounts::AccountStore;
use uget::provider::{Accountant, Provider, Providers};
use uget::Prompter;

use crate::cli::AccountsCommand;
use crate::commands::ProcessExit;
use crate::prompter::{TerminalPrompter, select_from};

pub async fn run(command: AccountsCommand) -> Result<u8> {
    let providers = Providers::default();
    let store = AccountStore::shared(None);
    match command {
        AccountsCommand::Add { provider } => add(&providers, &store, provider.as_deref()).await,
        AccountsCommand::List { provider } => list(&providers, &store, provider.as_deref()).await,
        AccountsCommand::Enable { provider } => {
            toggle(&providers, &store, provider.as_deref(), false).await
        }
        AccountsCommand::Disable { provider } => {
            toggle(&providers, &store, provider.as_deref(), true).await
        }
    }
}

async fn add(providers: &Providers, store: &AccountStore, name: Option<&str>) -> Result<u8> {
    let Some(provider) = select_accountant(providers, name)? else {
        return Ok(ProcessExit::Failure.code());
    };
    let accountant = accountant_of(&provider);
    let prompter = TerminalPrompter::new(provider.name());
    match accountant.new_account(&prompter) {
        Ok(account) => {
            store.add_account(account.as_ref()).await;
            prompter.success();
            Ok(ProcessExit::Success.code())
        }
        Err(prompt_error) => {
            prompter.error(&prompt_error.to_string());
            Ok(ProcessExit::Failure.code())
        }
    }
}

async fn list(providers: &Providers, store: &AccountStore, name: Option<&str>) -> Result<u8> {
    let selected: Vec<_> = match name {
        Some(name) => {
            let Some(provider) = providers.get(name) else {
                eprintln!("No provider named {name}");
                return Ok(ProcessExit::Failure.code());
            };
            if provider.accountant().is_none() {
                eprintln!("Provider {name} does not support accounts.");
                return Ok(ProcessExit::Failure.code());
            }
            vec![provider]
        }
        None => providers
            .iter()
            .filter(|provider| provider.accountant().is_some())
            .cloned()
            .collect(),
    };

    for provider in selected {
        println!("{}:", provider.name());
        for meta in store.metadata(provider.name()).await {
            if meta.disabled {
                println!("    {} (disabled)", meta.id);
            } else {
                println!("    {}", meta.id);
            }
        }
    }
    Ok(ProcessExit::Success.code())
}

async fn toggle(
    providers: &Providers,
    store: &AccountStore,
    name: Option<&str>,
    disable: bool,
) -> Result<u8> {
    let Some(provider) = select_accountant(providers, name)? else {
        return Ok(ProcessExit::Failure.code());
    };

    // Offer only the accounts the toggle would actually change.
    let ids: Vec<String> = store
        .metadata(provider.name())
        .await
        .into_iter()
        .filter(|meta| meta.disabled != disable)
        .map(|meta| meta.id)
        .collect();
    if ids.is_empty() {
        eprintln!("No matching accounts for {}.", provider.name());
        return Ok(ProcessExit::Failure.code());
    }

    let choice = match select_from(&ids, "Select an account") {
        Ok(choice) => choice,
        Err(prompt_error) => {
            eprintln!("Error: {prompt_error}");
            return Ok(ProcessExit::Failure.code());
        }
    };
    let changed = if disable {
        store.disable(provider.name(), &ids[choice]).await
    } else {
        store.enable(provider.name(), &ids[choice]).await
    };
    Ok(if changed {
        ProcessExit::Success.code()
    } else {
        ProcessExit::Failure.code()
    })
}

/// Resolves the provider to operate on: by name when given, otherwise by
/// interactive selection among the accountant-capable providers.
fn select_accountant(
    providers: &Providers,
    name: Option<&str>,
) -> Result<Option<std::sync::Arc<dyn Provider>>> {
    if let Some(name) = name {
        let Some(provider) = providers.get(name) else {
            eprintln!("No provider named {name}");
            return Ok(None);
        };
        if provider.accountant().is_none() {
            eprintln!("Provider {name} does not support accounts.");
            return Ok(None);
        }
        return Ok(Some(provider));
    }

    let candidates: Vec<_> = providers
        .iter()
        .filter(|provider| provider.accountant().is_some())
        .cloned()
        .collect();
    if candidates.is_empty() {
        eprintln!("No registered provider supports accounts.");
        return Ok(None);
    }
    let names: Vec<String> = candidates
        .iter()
        .map(|provider| provider.name().to_string())
        .collect();
    match select_from(&names, "Select a provider") {
        Ok(choice) => Ok(Some(candidates[choice].clone())),
        Err(prompt_error) => {
            eprintln!("Error: {prompt_error}");
            Ok(None)
        }
    }
}

/// The accountant capability of a provider already checked to have one.
fn accountant_of(provider: &std::sync::Arc<dyn Provider>) -> &dyn Accountant {
    provider
        .accountant()
        .unwrap_or_else(|| unreachable!("caller verified the accountant capability"))
}
