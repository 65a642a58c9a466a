//! Test catalog for the QC station.
//!
//! This module provides:
//! - `TestDefinition` describing one named check on the unit under test
//! - `Check`, the closed set of check kinds with their per-kind payload
//! - `Catalog`, the validated, ordered registry the orchestrator walks
//! - JSON loading with the built-in bench catalog as a fallback
//!
//! Catalog order is the canonical execution order. Nothing downstream resorts it.

use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

use crate::errors::CatalogError;

/// Category of a check, derived from its [`Check`] variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Category {
    Visual,
    Ui,
    AutomatedRemote,
    Firmware,
}

impl Category {
    /// Only automated remote checks may be attempted more than once.
    pub fn is_retry_eligible(self) -> bool {
        matches!(self, Category::AutomatedRemote)
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Category::Visual => write!(f, "VISUAL"),
            Category::Ui => write!(f, "UI"),
            Category::AutomatedRemote => write!(f, "AUTOMATED_REMOTE"),
            Category::Firmware => write!(f, "FIRMWARE"),
        }
    }
}

/// A single assertion on the output of a remote command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "pattern", rename_all = "snake_case")]
pub enum OutputCheck {
    /// stdout must contain the literal text
    Contains(String),
    /// stdout must match the regular expression
    Matches(String),
    /// neither stdout nor stderr may contain the literal text
    Lacks(String),
}

impl OutputCheck {
    /// Evaluate the check, returning a short reason when it is not satisfied.
    pub fn evaluate(&self, stdout: &str, stderr: &str) -> Option<String> {
        match self {
            OutputCheck::Contains(text) => {
                (!stdout.contains(text.as_str())).then(|| format!("expected output '{}'", text))
            }
            OutputCheck::Matches(pattern) => match Regex::new(pattern) {
                Ok(re) if re.is_match(stdout) => None,
                Ok(_) => Some(format!("output did not match /{}/", pattern)),
                Err(e) => Some(format!("invalid pattern /{}/: {}", pattern, e)),
            },
            OutputCheck::Lacks(text) => (stdout.contains(text.as_str())
                || stderr.contains(text.as_str()))
            .then(|| format!("unexpected output '{}'", text)),
        }
    }
}

/// What to run on the device for an automated remote check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    /// Shell text executed on the device
    pub command: String,
    /// Text written to the command's stdin (e.g. Enter presses for interactive demos)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdin: Option<String>,
    /// All checks must hold for the attempt to pass
    #[serde(default)]
    pub checks: Vec<OutputCheck>,
    /// Operator question asked after the command succeeded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirm: Option<String>,
}

impl CommandSpec {
    pub fn new(command: &str) -> Self {
        Self {
            command: command.to_string(),
            stdin: None,
            checks: Vec::new(),
            confirm: None,
        }
    }

    pub fn expect(mut self, check: OutputCheck) -> Self {
        self.checks.push(check);
        self
    }

    pub fn with_stdin(mut self, stdin: impl Into<String>) -> Self {
        self.stdin = Some(stdin.into());
        self
    }

    pub fn with_confirm(mut self, question: &str) -> Self {
        self.confirm = Some(question.to_string());
        self
    }
}

/// The kind of check, carrying what its handler needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Check {
    Visual { question: String },
    Ui { question: String },
    Remote(CommandSpec),
    Firmware,
}

impl Check {
    pub fn category(&self) -> Category {
        match self {
            Check::Visual { .. } => Category::Visual,
            Check::Ui { .. } => Category::Ui,
            Check::Remote(_) => Category::AutomatedRemote,
            Check::Firmware => Category::Firmware,
        }
    }
}

/// One named check on the unit under test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestDefinition {
    /// Short stable code (e.g. "T09")
    pub id: String,
    /// Human-readable name
    pub name: String,
    pub check: Check,
    /// Bench preparation shown once before the first selected test carrying it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub setup: Option<String>,
    /// Id of an earlier test that must pass before this one is attempted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requires: Option<String>,
}

impl TestDefinition {
    pub fn new(id: &str, name: &str, check: Check) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            check,
            setup: None,
            requires: None,
        }
    }

    pub fn with_setup(mut self, setup: &str) -> Self {
        self.setup = Some(setup.to_string());
        self
    }

    pub fn requires(mut self, id: &str) -> Self {
        self.requires = Some(id.to_string());
        self
    }

    #[inline]
    pub fn category(&self) -> Category {
        self.check.category()
    }

    #[inline]
    pub fn retry_eligible(&self) -> bool {
        self.category().is_retry_eligible()
    }

    /// Column label used in reports, e.g. `T09: USB MicroPython Detection`.
    pub fn label(&self) -> String {
        format!("{}: {}", self.id, self.name)
    }
}

/// Validated, ordered, read-only registry of test definitions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Catalog {
    definitions: Vec<TestDefinition>,
}

impl Catalog {
    /// Build a catalog, rejecting duplicate or empty ids, forward/unknown
    /// `requires` references and regexes that do not compile.
    pub fn new(definitions: Vec<TestDefinition>) -> Result<Self, CatalogError> {
        if definitions.is_empty() {
            return Err(CatalogError::Empty);
        }

        let mut seen = HashSet::new();
        for def in &definitions {
            if def.id.trim().is_empty() {
                return Err(CatalogError::EmptyId {
                    name: def.name.clone(),
                });
            }
            if let Some(req) = &def.requires {
                if !seen.contains(req.as_str()) {
                    return Err(CatalogError::UnknownRequirement {
                        id: def.id.clone(),
                        requires: req.clone(),
                    });
                }
            }
            if !seen.insert(def.id.as_str()) {
                return Err(CatalogError::DuplicateId(def.id.clone()));
            }
            if let Check::Remote(spec) = &def.check {
                for check in &spec.checks {
                    if let OutputCheck::Matches(pattern) = check {
                        Regex::new(pattern).map_err(|e| CatalogError::InvalidPattern {
                            id: def.id.clone(),
                            message: e.to_string(),
                        })?;
                    }
                }
            }
        }

        Ok(Self { definitions })
    }

    /// The fixed ordered sequence of definitions.
    pub fn definitions(&self) -> &[TestDefinition] {
        &self.definitions
    }

    pub fn get(&self, id: &str) -> Option<&TestDefinition> {
        self.definitions.iter().find(|d| d.id == id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.definitions.iter().map(|d| d.id.as_str())
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    /// Load a catalog from a JSON file (`{"tests": [...]}`).
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read catalog file: {}", path.display()))?;

        let file: CatalogFile = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse catalog JSON: {}", path.display()))?;

        Self::new(file.tests)
            .with_context(|| format!("Invalid catalog file: {}", path.display()))
    }

    /// Save the catalog as JSON, e.g. to seed a station-specific file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let file = CatalogFile {
            tests: self.definitions.clone(),
        };
        let content =
            serde_json::to_string_pretty(&file).context("Failed to serialize catalog to JSON")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write catalog file: {}", path.display()))?;
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct CatalogFile {
    tests: Vec<TestDefinition>,
}

/// Load the catalog from `path` when given and present, otherwise the built-in bench catalog.
pub fn load_catalog_or_default(path: Option<&Path>) -> Result<Catalog> {
    match path {
        Some(p) if p.exists() => Catalog::load(p),
        _ => Ok(default_catalog()),
    }
}

const BOOTLOADER_SETUP: &str = "Put the board into bootloader mode and connect it to this computer.";
const ASSEMBLY_SETUP: &str =
    "Unplug the board and insert: battery, camera module, e-ink display, SD card, and CM5.";
const RGB_LED_DEMO: &str =
    "python3 /opt/distiller-cm5-sdk/src/distiller_cm5_sdk/hardware/sam/led_interactive_demo.py";
const RGB_LED_ENTER_PRESSES: usize = 10;

/// The built-in catalog for the BHV bench.
pub fn default_catalog() -> Catalog {
    let definitions = vec![
        TestDefinition::new("T01", "Firmware Upload", Check::Firmware).with_setup(BOOTLOADER_SETUP),
        TestDefinition::new(
            "T02",
            "CM5 LED Visual Check",
            Check::Visual {
                question: "Does the CM5 LED light up?".into(),
            },
        )
        .with_setup(ASSEMBLY_SETUP),
        TestDefinition::new(
            "T03",
            "RGB LED Visual Check",
            Check::Visual {
                question: "Does the RGB LED light up?".into(),
            },
        )
        .with_setup(ASSEMBLY_SETUP),
        TestDefinition::new(
            "T04",
            "E-ink Display Refresh",
            Check::Visual {
                question: "Does the e-ink bootup screen appear?".into(),
            },
        )
        .with_setup(ASSEMBLY_SETUP),
        TestDefinition::new(
            "T05",
            "UI Appears",
            Check::Ui {
                question: "Wait for the WIFI UI to show up. Does the WIFI UI appear?".into(),
            },
        )
        .with_setup(ASSEMBLY_SETUP),
        TestDefinition::new(
            "T06",
            "Button Response",
            Check::Ui {
                question: "Press a button. Does the button show on dmesg?".into(),
            },
        )
        .with_setup(ASSEMBLY_SETUP)
        .requires("T05"),
        TestDefinition::new(
            "T07",
            "Voice Transcribed",
            Check::Ui {
                question: "Use Piper to record and speak a test message. Was your voice successfully transcribed?".into(),
            },
        )
        .with_setup(ASSEMBLY_SETUP)
        .requires("T05"),
        TestDefinition::new(
            "T09",
            "USB MicroPython Detection",
            Check::Remote(
                CommandSpec::new("lsusb")
                    .expect(OutputCheck::Contains("MicroPython Board in FS mode".into())),
            ),
        ),
        TestDefinition::new(
            "T10",
            "USB Hub Detection",
            Check::Remote(
                CommandSpec::new("lsusb")
                    .expect(OutputCheck::Contains("QinHeng Electronics USB HUB".into())),
            ),
        ),
        TestDefinition::new(
            "T11",
            "USB Media Detection",
            Check::Remote(CommandSpec::new("lsusb").expect(OutputCheck::Contains(
                "Microchip Technology, Inc. (formerly SMSC) Ultra Fast Media".into(),
            ))),
        ),
        TestDefinition::new(
            "T12",
            "RGB LED SSH Test",
            Check::Remote(
                CommandSpec::new(RGB_LED_DEMO)
                    .with_stdin("\n".repeat(RGB_LED_ENTER_PRESSES))
                    .with_confirm("Did you see the RGB LED cycle through different colors?"),
            ),
        ),
        TestDefinition::new(
            "T13",
            "SD Card Detection",
            Check::Remote(
                CommandSpec::new("lsblk").expect(OutputCheck::Matches(r"\bsda1\b".into())),
            ),
        ),
        TestDefinition::new(
            "T14",
            "Camera Detection",
            Check::Remote(
                CommandSpec::new("libcamera-hello")
                    .expect(OutputCheck::Lacks("no cameras available".into())),
            ),
        ),
    ];

    Catalog::new(definitions).expect("built-in catalog is valid")
}
