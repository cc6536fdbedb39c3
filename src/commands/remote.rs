//! `uget push`, `ps` and `rm`: container operations against a running
//! server.

use anyhow::{Context, Result};
use serde_json::Value;

use crate::cli::{HostArgs, PushArgs, RmArgs};
use crate::commands::{ProcessExit, gather_urls};
use crate::progress::maybe_pager;

fn endpoint(host: &str, path: &str) -> String {
    format!("http://{host}{path}")
}

pub async fn push(args: PushArgs) -> Result<u8> {
    let urls = match gather_urls(&args.args, args.inline) {
        Ok(urls) => urls,
        Err(usage_error) => {
            eprintln!("{usage_error:#}");
            return Ok(ProcessExit::Usage.code());
        }
    };
    let links: Vec<String> = urls.iter().map(|url| url.to_string()).collect();
    let response: Value = reqwest::Client::new()
        .post(endpoint(&args.host, "/containers"))
        .json(&links)
        .send()
        .await
        .context("pushing to server")?
        .error_for_status()
        .context("server rejected the container")?
        .json()
        .await
        .context("decoding server response")?;
    println!("{}", response["id"].as_str().unwrap_or_default());
    Ok(ProcessExit::Success.code())
}

pub async fn ps(args: &HostArgs) -> Result<u8> {
    let files: Vec<Value> = reqwest::Client::new()
        .get(endpoint(&args.host, "/containers"))
        .send()
        .await
        .context("listing containers")?
        .error_for_status()
        .context("server rejected the listing")?
        .json()
        .await
        .context("decoding server response")?;

    let mut out = String::new();
    for file in &files {
        let id = file["id"].as_str().unwrap_or_default();
        let name = file["name"].as_str().unwrap_or("-");
        out.push_str(&format!("{:.12}    {}\n", id, name));
    }
    if let Some(mut pager) = maybe_pager(files.len()) {
        use std::io::Write;
        if let Some(stdin) = pager.stdin.as_mut() {
            let _ = stdin.write_all(out.as_bytes());
        }
        drop(pager.stdin.take());
        let _ = pager.wait();
    } else {
        print!("{out}");
    }
    Ok(ProcessExit::Success.code())
}

pub async fn rm(args: &RmArgs) -> Result<u8> {
    let response = reqwest::Client::new()
        .delete(endpoint(&args.host, &format!("/containers/{}", args.id)))
        .send()
        .await
        .context("removing container")?;
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    if status.is_success() {
        println!("{body}");
        Ok(ProcessExit::Success.code())
    } else {
        eprintln!("{status}: {body}");
        Ok(ProcessExit::Failure.code())
    }
}
