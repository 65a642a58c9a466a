//! Operator prompts on the station terminal.
//!
//! `--yes` answers plain confirmations and retry/continue gates with their
//! default. Pass/fail judgements always need an operator.

use anyhow::{Result, bail};
use console::style;
use dialoguer::{Confirm, Input, MultiSelect, Select, theme::ColorfulTheme};
use std::collections::HashSet;

use crate::catalog::{Catalog, TestDefinition};
use crate::orchestrator::{
    DeviceIdProvider, FailureDecision, Interaction, ManualVerdict, RetryDecision, Selector,
};
use crate::session::{DeviceInfo, TestExecutionRecord};

pub struct TerminalInteraction {
    pub skip_all: bool,
    theme: ColorfulTheme,
}

impl TerminalInteraction {
    pub fn new(skip_all: bool) -> Self {
        Self {
            skip_all,
            theme: ColorfulTheme::default(),
        }
    }

    fn auto(&self, answer: &str) {
        println!("  {} {} (--yes flag)", style("Auto:").dim(), answer);
    }
}

impl Interaction for TerminalInteraction {
    fn acknowledge(&mut self, instruction: &str) -> Result<()> {
        println!();
        println!("{} {}", style("Setup:").cyan().bold(), instruction);
        if self.skip_all {
            self.auto("ready");
            return Ok(());
        }
        let _: String = Input::with_theme(&self.theme)
            .with_prompt("Press Enter when ready")
            .allow_empty(true)
            .interact_text()?;
        Ok(())
    }

    fn present_check(
        &mut self,
        definition: &TestDefinition,
        question: &str,
    ) -> Result<ManualVerdict> {
        let options = &["Yes (PASS)", "No (FAIL)"];
        let selection = Select::with_theme(&self.theme)
            .with_prompt(format!("{} {}", style(&definition.id).yellow(), question))
            .items(options)
            .default(0)
            .interact()?;

        match selection {
            0 => Ok(ManualVerdict::pass()),
            1 => {
                let notes: String = Input::with_theme(&self.theme)
                    .with_prompt("What did you observe? (optional)")
                    .allow_empty(true)
                    .interact_text()?;
                Ok(ManualVerdict::fail(notes.trim()))
            }
            _ => unreachable!(),
        }
    }

    fn decide_retry(
        &mut self,
        definition: &TestDefinition,
        attempts: u32,
        max_attempts: u32,
        reason: &str,
    ) -> Result<RetryDecision> {
        println!(
            "  {} {} attempt {}/{}: {}",
            style("✗").red(),
            definition.id,
            attempts,
            max_attempts,
            reason
        );
        if self.skip_all {
            self.auto("retry");
            return Ok(RetryDecision::Retry);
        }

        let options = &[
            "Retry",
            "Stop retrying (record FAIL)",
            "Abort session",
        ];
        let selection = Select::with_theme(&self.theme)
            .with_prompt(format!(
                "{} failed ({} of {} attempts). Retry?",
                definition.id, attempts, max_attempts
            ))
            .items(options)
            .default(0)
            .interact()?;

        match selection {
            0 => Ok(RetryDecision::Retry),
            1 => Ok(RetryDecision::GiveUp),
            2 => Ok(RetryDecision::Abort),
            _ => unreachable!(),
        }
    }

    fn decide_after_failure(
        &mut self,
        definition: &TestDefinition,
        record: &TestExecutionRecord,
    ) -> Result<FailureDecision> {
        if self.skip_all {
            self.auto("continue");
            return Ok(FailureDecision::Continue);
        }

        let options = &[
            "Continue with the next test",
            "Restart this test",
            "Abort session",
        ];
        let selection = Select::with_theme(&self.theme)
            .with_prompt(format!(
                "{} failed after {} attempt(s). What next?",
                definition.label(),
                record.attempts
            ))
            .items(options)
            .default(0)
            .interact()?;

        match selection {
            0 => Ok(FailureDecision::Continue),
            1 => Ok(FailureDecision::Restart),
            2 => Ok(FailureDecision::Abort),
            _ => unreachable!(),
        }
    }

    fn confirm(&mut self, prompt: &str) -> Result<bool> {
        if self.skip_all {
            self.auto(prompt);
            return Ok(true);
        }
        Ok(Confirm::with_theme(&self.theme)
            .with_prompt(prompt)
            .default(true)
            .interact()?)
    }
}

/// Pick tests with a checkbox list; everything starts checked.
pub struct TerminalSelector;

impl Selector for TerminalSelector {
    fn select(&mut self, catalog: &Catalog) -> Result<HashSet<String>> {
        let items: Vec<String> = catalog
            .definitions()
            .iter()
            .map(|d| format!("{} ({})", d.label(), d.category()))
            .collect();
        let defaults = vec![true; items.len()];

        let chosen = MultiSelect::with_theme(&ColorfulTheme::default())
            .with_prompt("Select tests to run (space toggles, enter confirms)")
            .items(&items)
            .defaults(&defaults)
            .interact()?;

        Ok(chosen
            .into_iter()
            .map(|i| catalog.definitions()[i].id.clone())
            .collect())
    }
}

/// Selection from `--only` / `--skip` without prompting.
pub struct FixedSelector {
    only: Vec<String>,
    skip: Vec<String>,
}

impl FixedSelector {
    pub fn new(only: Vec<String>, skip: Vec<String>) -> Self {
        Self { only, skip }
    }
}

/// Resolve operator-typed ids to the catalog's own spelling, ignoring case.
fn resolve_ids(catalog: &Catalog, ids: &[String]) -> Result<Vec<String>> {
    ids.iter()
        .map(|id| id.trim())
        .filter(|id| !id.is_empty())
        .map(|id| {
            catalog
                .ids()
                .find(|known| known.eq_ignore_ascii_case(id))
                .map(str::to_string)
                .ok_or_else(|| {
                    anyhow::anyhow!(
                        "Unknown test id '{}'. Known ids: {}",
                        id,
                        catalog.ids().collect::<Vec<_>>().join(", ")
                    )
                })
        })
        .collect()
}

impl Selector for FixedSelector {
    fn select(&mut self, catalog: &Catalog) -> Result<HashSet<String>> {
        let only = resolve_ids(catalog, &self.only)?;
        let skip = resolve_ids(catalog, &self.skip)?;

        Ok(catalog
            .ids()
            .filter(|id| only.is_empty() || only.iter().any(|o| o == id))
            .filter(|id| !skip.iter().any(|s| s == id))
            .map(str::to_string)
            .collect())
    }
}

/// Device ids are non-negative integers.
pub fn parse_device_id(input: &str) -> Result<String> {
    let trimmed = input.trim();
    if trimmed.is_empty() || !trimmed.chars().all(|c| c.is_ascii_digit()) {
        bail!("Invalid device ID '{}': please enter a number", trimmed);
    }
    let id: u64 = trimmed
        .parse()
        .map_err(|_| anyhow::anyhow!("Device ID '{}' is too large", trimmed))?;
    Ok(id.to_string())
}

/// Reads the device id from the terminal, re-prompting until it is valid.
pub struct TerminalDeviceId {
    preset: Option<String>,
    version: Option<String>,
    manufacture_id: Option<String>,
}

impl TerminalDeviceId {
    /// `preset` (from `--device-id`) is used once, for the first session.
    pub fn new(preset: Option<String>) -> Self {
        Self {
            preset,
            version: None,
            manufacture_id: None,
        }
    }

    /// Version and manufacture id recorded for the first session.
    pub fn with_details(mut self, version: Option<String>, manufacture_id: Option<String>) -> Self {
        self.version = version.filter(|v| !v.trim().is_empty());
        self.manufacture_id = manufacture_id.filter(|m| !m.trim().is_empty());
        self
    }

    /// Use the preset when it parses; otherwise fall back to `prompt`.
    fn resolve(&mut self, prompt: impl FnOnce() -> Result<String>) -> Result<DeviceInfo> {
        let id = match self.preset.take().map(|p| (parse_device_id(&p), p)) {
            Some((Ok(id), _)) => id,
            Some((Err(e), raw)) => {
                tracing::warn!(preset = %raw, error = %e, "ignoring --device-id");
                println!("{} {}", style("Warning:").yellow().bold(), e);
                parse_device_id(&prompt()?)?
            }
            None => parse_device_id(&prompt()?)?,
        };
        Ok(DeviceInfo {
            id,
            version: self.version.take(),
            manufacture_id: self.manufacture_id.take(),
        })
    }
}

fn prompt_device_id() -> Result<String> {
    let raw: String = Input::with_theme(&ColorfulTheme::default())
        .with_prompt("Enter device ID (integer)")
        .validate_with(|input: &String| -> Result<(), String> {
            parse_device_id(input).map(|_| ()).map_err(|e| e.to_string())
        })
        .interact_text()?;
    Ok(raw)
}

impl DeviceIdProvider for TerminalDeviceId {
    fn device_info(&mut self) -> Result<DeviceInfo> {
        let device = self.resolve(prompt_device_id)?;
        println!("Device ID = {}", style(&device.id).yellow().bold());
        Ok(device)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::default_catalog;

    fn ids(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_fixed_selector_defaults_to_all() {
        let catalog = default_catalog();
        let selected = FixedSelector::new(vec![], vec![]).select(&catalog).unwrap();
        assert_eq!(selected.len(), catalog.len());
    }

    #[test]
    fn test_fixed_selector_only_and_skip() {
        let catalog = default_catalog();
        let selected = FixedSelector::new(ids(&["t09", "T10", " T13 "]), ids(&["T10"]))
            .select(&catalog)
            .unwrap();
        let expected: HashSet<String> = ["T09".to_string(), "T13".to_string()].into();
        assert_eq!(selected, expected);
    }

    #[test]
    fn test_fixed_selector_skip_everything() {
        let catalog = default_catalog();
        let all: Vec<String> = catalog.ids().map(str::to_string).collect();
        let selected = FixedSelector::new(vec![], all).select(&catalog).unwrap();
        assert!(selected.is_empty());
    }

    #[test]
    fn test_fixed_selector_rejects_unknown_id() {
        let catalog = default_catalog();
        let err = FixedSelector::new(ids(&["T08"]), vec![])
            .select(&catalog)
            .unwrap_err();
        assert!(err.to_string().contains("Unknown test id 'T08'"));
    }

    #[test]
    fn test_fixed_selector_keeps_catalog_spelling() {
        let catalog = Catalog::new(vec![
            TestDefinition::new(
                "led-a",
                "Power LED",
                crate::catalog::Check::Visual {
                    question: "Is the LED on?".into(),
                },
            ),
            TestDefinition::new(
                "Usb1",
                "USB hub",
                crate::catalog::Check::Visual {
                    question: "Is the hub lit?".into(),
                },
            ),
        ])
        .unwrap();
        let selected = FixedSelector::new(ids(&["LED-A", "usb1"]), ids(&["USB1"]))
            .select(&catalog)
            .unwrap();
        let expected: HashSet<String> = ["led-a".to_string()].into();
        assert_eq!(selected, expected);
    }

    #[test]
    fn test_parse_device_id() {
        assert_eq!(parse_device_id(" 1042 ").unwrap(), "1042");
        assert_eq!(parse_device_id("007").unwrap(), "7");
        assert!(parse_device_id("").is_err());
        assert!(parse_device_id("abc").is_err());
        assert!(parse_device_id("-3").is_err());
        assert!(parse_device_id("12.5").is_err());
    }

    #[test]
    fn test_preset_device_id_used_once() {
        let mut provider = TerminalDeviceId::new(Some("55".into()));
        assert_eq!(provider.device_info().unwrap().id, "55");
        assert!(provider.preset.is_none());
    }

    #[test]
    fn test_invalid_preset_falls_back_to_prompt() {
        let mut provider = TerminalDeviceId::new(Some("x1".into()));
        let device = provider.resolve(|| Ok("77".to_string())).unwrap();
        assert_eq!(device.id, "77");
        assert!(provider.preset.is_none());
    }

    #[test]
    fn test_details_recorded_for_first_device_only() {
        let mut provider = TerminalDeviceId::new(Some("12".into()))
            .with_details(Some("v1.2".into()), Some("MF-0042".into()));
        let first = provider.resolve(|| unreachable!()).unwrap();
        assert_eq!(first.id, "12");
        assert_eq!(first.version.as_deref(), Some("v1.2"));
        assert_eq!(first.manufacture_id.as_deref(), Some("MF-0042"));

        let second = provider.resolve(|| Ok("13".to_string())).unwrap();
        assert_eq!(second.id, "13");
        assert!(second.version.is_none());
        assert!(second.manufacture_id.is_none());
    }

    #[test]
    fn test_skip_all_answers_gates() {
        let catalog = default_catalog();
        let def = catalog.get("T09").unwrap();
        let mut gate = TerminalInteraction::new(true);
        gate.acknowledge("connect the board").unwrap();
        assert_eq!(
            gate.decide_retry(def, 1, 5, "refused").unwrap(),
            RetryDecision::Retry
        );
        assert!(gate.confirm("Shut down?").unwrap());
    }
}
