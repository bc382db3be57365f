use anyhow::Result;
use dialoguer::{theme::ColorfulTheme, Confirm, Input, Select};
use url::Url;

use crate::core::config::Config;
use crate::core::tasks::Backend;

pub fn show_config_panel(config: &mut Config) -> Result<bool> {
    let theme = ColorfulTheme::default();
    loop {
        let options = vec![
            format!("🌐 Service URL ({})", config.api_base_url),
            format!(
                "🔑 API Token ({})",
                if config.api_token.is_some() { "set" } else { "not set" }
            ),
            format!("⏱️  Request Timeout ({}s)", config.timeout_secs),
            format!("🔄 Refresh Interval ({}ms)", config.refresh_interval_ms),
            format!("📉 Max Backoff Factor (x{})", config.max_backoff_factor),
            format!("⏸️  Skip Tick While Busy ({})", on_off(config.skip_when_busy)),
            format!("🔔 Desktop Notifications ({})", on_off(config.desktop_notifications)),
            format!("⚙️  Default Backend ({})", config.default_backend),
            format!("🈯 Default Language ({})", config.default_lang),
            "💾 Save and Exit".to_string(),
            "❌ Exit without Saving".to_string(),
        ];

        let selection = Select::with_theme(&theme)
            .with_prompt("⚙️  Configuration Panel")
            .items(&options)
            .default(0)
            .interact()?;

        match selection {
            0 => {
                config.api_base_url = Input::with_theme(&theme)
                    .with_prompt("Task service base URL")
                    .default(config.api_base_url.clone())
                    .validate_with(|input: &String| validate_base_url(input))
                    .interact_text()?;
                println!("✓ Service URL set to {}", config.api_base_url);
            }
            1 => {
                let token: String = Input::with_theme(&theme)
                    .with_prompt("Bearer token (leave empty to clear)")
                    .allow_empty(true)
                    .interact_text()?;
                config.api_token = Some(token.trim().to_string()).filter(|t| !t.is_empty());
                println!(
                    "✓ Token {}",
                    if config.api_token.is_some() { "stored" } else { "cleared" }
                );
            }
            2 => {
                config.timeout_secs = Input::with_theme(&theme)
                    .with_prompt("Request timeout (seconds)")
                    .default(config.timeout_secs)
                    .validate_with(|input: &u64| positive(*input, "Timeout must be at least 1 second"))
                    .interact()?;
                println!("✓ Timeout set to {} seconds", config.timeout_secs);
            }
            3 => {
                config.refresh_interval_ms = Input::with_theme(&theme)
                    .with_prompt("Auto-refresh interval (milliseconds)")
                    .default(config.refresh_interval_ms)
                    .validate_with(|input: &u64| -> Result<(), &str> {
                        if *input >= 100 {
                            Ok(())
                        } else {
                            Err("Interval must be at least 100ms")
                        }
                    })
                    .interact()?;
                println!("✓ Refresh interval set to {}ms", config.refresh_interval_ms);
            }
            4 => {
                config.max_backoff_factor = Input::with_theme(&theme)
                    .with_prompt("Max backoff factor after failed refreshes (1 = fixed interval)")
                    .default(config.max_backoff_factor)
                    .validate_with(|input: &u32| positive(u64::from(*input), "Factor must be at least 1"))
                    .interact()?;
                println!("✓ Backoff capped at x{}", config.max_backoff_factor);
            }
            5 => {
                config.skip_when_busy = Confirm::with_theme(&theme)
                    .with_prompt("Skip a refresh tick while the previous one is still running?")
                    .default(config.skip_when_busy)
                    .interact()?;
                println!("✓ Busy skip {}", enabled(config.skip_when_busy));
            }
            6 => {
                config.desktop_notifications = Confirm::with_theme(&theme)
                    .with_prompt("Show desktop notifications?")
                    .default(config.desktop_notifications)
                    .interact()?;
                println!("✓ Desktop notifications {}", enabled(config.desktop_notifications));
            }
            7 => change_backend(config, &theme)?,
            8 => {
                config.default_lang = Input::with_theme(&theme)
                    .with_prompt("Default OCR language")
                    .default(config.default_lang.clone())
                    .interact_text()?;
                println!("✓ Default language set to {}", config.default_lang);
            }
            9 => {
                println!("💾 Saving configuration...");
                return Ok(true);
            }
            10 => {
                println!("❌ Discarding changes...");
                return Ok(false);
            }
            _ => {}
        }

        println!();
    }
}

fn change_backend(config: &mut Config, theme: &ColorfulTheme) -> Result<()> {
    let names: Vec<&str> = Backend::ALL.iter().map(Backend::as_str).collect();
    let current = Backend::ALL
        .iter()
        .position(|b| *b == config.default_backend)
        .unwrap_or(0);

    let selection = Select::with_theme(theme)
        .with_prompt("⚙️  Select default backend")
        .items(&names)
        .default(current)
        .interact()?;

    if let Some(backend) = Backend::ALL.get(selection) {
        config.default_backend = *backend;
        println!("✓ Default backend changed to: {}", backend);
    }
    Ok(())
}

fn validate_base_url(input: &str) -> Result<(), String> {
    match Url::parse(input.trim()) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => Ok(()),
        Ok(url) => Err(format!("Unsupported scheme: {}", url.scheme())),
        Err(err) => Err(format!("Invalid URL: {}", err)),
    }
}

fn positive(value: u64, message: &'static str) -> Result<(), &'static str> {
    if value >= 1 {
        Ok(())
    } else {
        Err(message)
    }
}

fn on_off(flag: bool) -> &'static str {
    if flag {
        "on"
    } else {
        "off"
    }
}

fn enabled(flag: bool) -> &'static str {
    if flag {
        "enabled"
    } else {
        "disabled"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_must_be_http() {
        assert!(validate_base_url("http://localhost:8000").is_ok());
        assert!(validate_base_url(" https://queue.example.com/tianshu ").is_ok());
        assert!(validate_base_url("ftp://example.com").is_err());
        assert!(validate_base_url("localhost").is_err());
    }
}
