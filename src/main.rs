use anyhow::{ensure, Context, Result};
use clap::{Parser, ValueEnum};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use regex::Regex;
use serde::Serialize;
use std::ffi::OsString;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::PathBuf;
use std::sync::LazyLock;
use tracing::{debug, info};

// ─── CLI ──────────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(author, version, about = "Strip comment and description lines from network device configs and obfuscate every IPv4/IPv6 address before sharing them.")]
struct Args {
    /// Config file to sanitize (standard input when omitted)
    #[arg(long = "fName", value_name = "PATH")]
    f_name: Option<PathBuf>,

    /// Address generation strategy [default: shuffle for files, range for stdin]
    #[arg(long, value_enum)]
    strategy: Option<StrategyKind>,

    /// Shuffle the first IPv4 octet / IPv6 group too instead of keeping it
    #[arg(long, default_value_t = false)]
    shuffle_leading: bool,

    /// First octet written by the range strategy
    #[arg(long, default_value_t = 192)]
    leading_octet: u8,

    /// Lowest octet value drawn by the range strategy
    #[arg(long, default_value_t = 10)]
    range_min: u8,

    /// Highest octet value drawn by the range strategy
    #[arg(long, default_value_t = 240)]
    range_max: u8,

    /// Only treat complete IPv4 tokens (with optional /mask) as addresses
    #[arg(long, default_value_t = false)]
    strict_ipv4: bool,

    /// Seed the generator for reproducible output
    #[arg(long)]
    seed: Option<u64>,

    /// Print a JSON summary to stderr when done
    #[arg(long, default_value_t = false)]
    report: bool,

    /// Enable debug logging
    #[arg(short, long, default_value_t = false)]
    verbose: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum StrategyKind {
    /// Keep the first segment, shuffle the digits of the others
    Shuffle,
    /// Fixed first octet, random octets from a range
    Range,
}

impl Args {
    fn strategy(&self) -> Result<Strategy> {
        let kind = self.strategy.unwrap_or(match self.f_name {
            Some(_) => StrategyKind::Shuffle,
            None    => StrategyKind::Range,
        });
        match kind {
            StrategyKind::Shuffle => Ok(Strategy::Shuffle { keep_leading: !self.shuffle_leading }),
            StrategyKind::Range   => Strategy::range(self.leading_octet, self.range_min, self.range_max),
        }
    }
}

/// Accept the single-dash `-fName` spelling alongside `--fName`.
fn normalize_args<I: IntoIterator<Item = OsString>>(args: I) -> Vec<OsString> {
    args.into_iter()
        .map(|arg| match arg.to_str() {
            Some(s) if s == "-fName" || s.starts_with("-fName=") => OsString::from(format!("-{s}")),
            _ => arg,
        })
        .collect()
}

// ─── Stats ────────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Serialize)]
struct SanitizeStats {
    lines_read:              u64,
    lines_emitted:           u64,
    lines_dropped:           u64,
    block_comments_dropped:  u64,
    comment_closers_dropped: u64,
    descriptions_dropped:    u64,
    ipv4_replaced:           u64,
    ipv6_replaced:           u64,
}

// ─── Line classifier ──────────────────────────────────────────────────────────

static DESCRIPTION_STMT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*description.*;").expect("description regex should compile")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DropReason { BlockComment, CommentCloser, Description }

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verdict { Keep, Drop(DropReason) }

fn classify(line: &str) -> Verdict {
    if line.contains("**") {
        Verdict::Drop(DropReason::BlockComment)
    } else if line.contains("*/") {
        Verdict::Drop(DropReason::CommentCloser)
    } else if DESCRIPTION_STMT.is_match(line) {
        Verdict::Drop(DropReason::Description)
    } else {
        Verdict::Keep
    }
}

// ─── Address detector ─────────────────────────────────────────────────────────
//
// The default IPv4 pattern is anchored at the start only: four octets, each
// followed by `.`, `/` or end of token. Whatever follows the fourth separator
// is accepted, so `1.2.3.4/24` and `1.2.3.4.5` both match. `--strict-ipv4`
// switches to full-token anchoring.

static IPV4_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^((25[0-5]|2[0-4][0-9]|1[0-9]{2}|[1-9]?[0-9])(\.|/|$)){4}")
        .expect("IPv4 regex should compile")
});

static IPV4_STRICT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"^((25[0-5]|2[0-4][0-9]|1[0-9]{2}|[1-9]?[0-9])\.){3}",
        r"(25[0-5]|2[0-4][0-9]|1[0-9]{2}|[1-9]?[0-9])",
        r"(/(3[0-2]|[12]?[0-9]))?$"
    ))
    .expect("strict IPv4 regex should compile")
});

static IPV6_ADDR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"^(",
        r"([0-9a-fA-F]{1,4}:){7}[0-9a-fA-F]{1,4}|",          // full form
        r"([0-9a-fA-F]{1,4}:){1,7}:|",                        // trailing ::
        r"([0-9a-fA-F]{1,4}:){1,6}:[0-9a-fA-F]{1,4}|",        // :: in the middle
        r"([0-9a-fA-F]{1,4}:){1,5}(:[0-9a-fA-F]{1,4}){1,2}|",
        r"([0-9a-fA-F]{1,4}:){1,4}(:[0-9a-fA-F]{1,4}){1,3}|",
        r"([0-9a-fA-F]{1,4}:){1,3}(:[0-9a-fA-F]{1,4}){1,4}|",
        r"([0-9a-fA-F]{1,4}:){1,2}(:[0-9a-fA-F]{1,4}){1,5}|",
        r"[0-9a-fA-F]{1,4}:((:[0-9a-fA-F]{1,4}){1,6})|",
        r":((:[0-9a-fA-F]{1,4}){1,7}|:)|",                    // leading ::
        r"fe80:(:[0-9a-fA-F]{0,4}){0,4}%[0-9a-zA-Z]+|",       // link-local with zone
        r"::(ffff(:0{1,4})?:)?((25[0-5]|(2[0-4]|1?[0-9])?[0-9])\.){3}(25[0-5]|(2[0-4]|1?[0-9])?[0-9])|",
        r"([0-9a-fA-F]{1,4}:){1,4}:((25[0-5]|(2[0-4]|1?[0-9])?[0-9])\.){3}(25[0-5]|(2[0-4]|1?[0-9])?[0-9])",
        r")(/|$)"
    ))
    .expect("IPv6 regex should compile")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AddressKind { V4, V6 }

fn is_ipv4(token: &str) -> bool { IPV4_PREFIX.is_match(token) }

fn is_ipv4_strict(token: &str) -> bool { IPV4_STRICT.is_match(token) }

fn is_ipv6(token: &str) -> bool { IPV6_ADDR.is_match(token) }

#[derive(Debug, Clone, Copy, Default)]
struct Detector { strict_ipv4: bool }

impl Detector {
    fn detect(&self, token: &str) -> Option<AddressKind> {
        let v4 = if self.strict_ipv4 { is_ipv4_strict(token) } else { is_ipv4(token) };
        if v4 {
            Some(AddressKind::V4)
        } else if is_ipv6(token) {
            Some(AddressKind::V6)
        } else {
            None
        }
    }
}

// ─── Address generator ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Strategy {
    /// Keep segment boundaries; shuffle each segment's characters.
    /// `keep_leading` leaves the first octet/group untouched.
    Shuffle { keep_leading: bool },
    /// IPv4 becomes `leading_octet.x.y.z` with x, y, z drawn from `low..=high`.
    /// IPv6 is shuffled with the first group kept.
    Range { leading_octet: u8, low: u8, high: u8 },
}

impl Strategy {
    fn range(leading_octet: u8, low: u8, high: u8) -> Result<Self> {
        ensure!(low <= high, "range minimum {low} is above range maximum {high}");
        Ok(Strategy::Range { leading_octet, low, high })
    }

    fn keeps_leading(&self) -> bool {
        match *self {
            Strategy::Shuffle { keep_leading } => keep_leading,
            Strategy::Range { .. }             => true,
        }
    }
}

/// Splits `addr/mask` at the first `/`. The mask is handed back verbatim.
fn split_mask(token: &str) -> (&str, Option<&str>) {
    match token.split_once('/') {
        Some((addr, mask)) => (addr, Some(mask)),
        None               => (token, None),
    }
}

fn with_suffix(mut addr: String, sep: char, suffix: Option<&str>) -> String {
    if let Some(s) = suffix {
        addr.push(sep);
        addr.push_str(s);
    }
    addr
}

fn shuffle_chars<R: Rng + ?Sized>(s: &str, rng: &mut R) -> String {
    let mut chars: Vec<char> = s.chars().collect();
    chars.shuffle(rng);
    chars.into_iter().collect()
}

/// Reads a decimal digit string and wraps it into a byte (`300` → `44`).
fn wrap_octet(digits: &str) -> Result<u8> {
    ensure!(!digits.is_empty(), "empty octet");
    let value = digits.chars().try_fold(0u32, |acc, c| -> Result<u32> {
        let d = c.to_digit(10).with_context(|| format!("octet {digits:?} is not a decimal number"))?;
        Ok((acc * 10 + d) % 256)
    })?;
    Ok(value as u8)
}

struct AddressGenerator<R: Rng> {
    strategy: Strategy,
    rng:      R,
}

impl<R: Rng> AddressGenerator<R> {
    fn new(strategy: Strategy, rng: R) -> Self {
        Self { strategy, rng }
    }

    fn ipv4(&mut self, token: &str) -> Result<String> {
        let (addr, mask) = split_mask(token);
        let out = match self.strategy {
            Strategy::Shuffle { keep_leading } => self.shuffle_v4(addr, keep_leading)?,
            Strategy::Range { leading_octet, low, high } => self.range_v4(leading_octet, low, high),
        };
        Ok(with_suffix(out, '/', mask))
    }

    fn ipv6(&mut self, token: &str) -> Result<String> {
        let (addr, mask) = split_mask(token);
        let (addr, zone) = match addr.split_once('%') {
            Some((a, z)) => (a, Some(z)),
            None         => (addr, None),
        };
        let keep_leading = self.strategy.keeps_leading();
        let mut groups = Vec::new();
        for (idx, group) in addr.split(':').enumerate() {
            if idx == 0 && keep_leading {
                groups.push(group.to_string());
            } else if group.contains('.') {
                groups.push(self.shuffle_dotted(group)?);
            } else {
                groups.push(shuffle_chars(group, &mut self.rng));
            }
        }
        let out = with_suffix(groups.join(":"), '%', zone);
        Ok(with_suffix(out, '/', mask))
    }

    // A literal "0" first octet marks a placeholder address; it is left alone.
    fn shuffle_v4(&mut self, addr: &str, keep_leading: bool) -> Result<String> {
        if addr.split('.').next() == Some("0") {
            return Ok(addr.to_string());
        }
        let mut octets = Vec::new();
        for (idx, octet) in addr.split('.').enumerate() {
            if (idx == 0 && keep_leading) || octet.is_empty() {
                octets.push(octet.to_string());
            } else {
                octets.push(wrap_octet(&shuffle_chars(octet, &mut self.rng))?.to_string());
            }
        }
        Ok(octets.join("."))
    }

    // Embedded IPv4 tail of an IPv6 address: every octet is shuffled.
    fn shuffle_dotted(&mut self, tail: &str) -> Result<String> {
        let octets = tail
            .split('.')
            .map(|octet| -> Result<String> { Ok(wrap_octet(&shuffle_chars(octet, &mut self.rng))?.to_string()) })
            .collect::<Result<Vec<_>>>()?;
        Ok(octets.join("."))
    }

    fn range_v4(&mut self, leading_octet: u8, low: u8, high: u8) -> String {
        let rest: Vec<String> = (0..3).map(|_| self.rng.gen_range(low..=high).to_string()).collect();
        format!("{leading_octet}.{}", rest.join("."))
    }
}

// ─── Line transformer ─────────────────────────────────────────────────────────

struct Sanitizer<R: Rng> {
    detector:  Detector,
    generator: AddressGenerator<R>,
    stats:     SanitizeStats,
}

impl<R: Rng> Sanitizer<R> {
    fn new(detector: Detector, generator: AddressGenerator<R>) -> Self {
        Self { detector, generator, stats: SanitizeStats::default() }
    }

    /// Returns `None` for dropped lines.
    fn process_line(&mut self, line: &str) -> Result<Option<String>> {
        self.stats.lines_read += 1;
        if let Verdict::Drop(reason) = classify(line) {
            debug!("Dropping line {} ({:?})", self.stats.lines_read, reason);
            self.stats.lines_dropped += 1;
            match reason {
                DropReason::BlockComment  => self.stats.block_comments_dropped += 1,
                DropReason::CommentCloser => self.stats.comment_closers_dropped += 1,
                DropReason::Description   => self.stats.descriptions_dropped += 1,
            }
            return Ok(None);
        }
        let out = self.transform_line(line)?;
        self.stats.lines_emitted += 1;
        Ok(Some(out))
    }

    /// Rewrites every address token. One trailing `;` is held back during
    /// tokenization so it never sticks to the last token.
    fn transform_line(&mut self, line: &str) -> Result<String> {
        let (body, terminated) = match line.strip_suffix(';') {
            Some(body) => (body, true),
            None       => (line, false),
        };
        let mut tokens = Vec::new();
        for token in body.split(' ') {
            let replaced = match self.detector.detect(token) {
                Some(AddressKind::V4) => {
                    self.stats.ipv4_replaced += 1;
                    self.generator.ipv4(token).with_context(|| format!("Cannot obfuscate {token:?}"))?
                }
                Some(AddressKind::V6) => {
                    self.stats.ipv6_replaced += 1;
                    self.generator.ipv6(token).with_context(|| format!("Cannot obfuscate {token:?}"))?
                }
                None => token.to_string(),
            };
            tokens.push(replaced);
        }
        let mut out = tokens.join(" ");
        if terminated { out.push(';'); }
        Ok(out)
    }

    fn stats(&self) -> &SanitizeStats { &self.stats }
}

// ─── Driver ───────────────────────────────────────────────────────────────────

fn run<I: BufRead, W: Write, R: Rng>(input: I, output: &mut W, sanitizer: &mut Sanitizer<R>) -> Result<()> {
    for (idx, line) in input.lines().enumerate() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                output.flush()?;
                return Err(e).with_context(|| format!("Read error at line {}", idx + 1));
            }
        };
        if let Some(out) = sanitizer.process_line(&line)? {
            writeln!(output, "{out}")?;
        }
    }
    output.flush()?;
    Ok(())
}

// ─── Main ─────────────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let args = Args::parse_from(normalize_args(std::env::args_os()));
    let log_level = if args.verbose { tracing::Level::DEBUG } else { tracing::Level::INFO };
    tracing_subscriber::fmt().with_max_level(log_level).with_target(false).with_writer(io::stderr).init();

    let strategy = args.strategy()?;
    let rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None       => StdRng::from_entropy(),
    };
    let detector      = Detector { strict_ipv4: args.strict_ipv4 };
    let mut sanitizer = Sanitizer::new(detector, AddressGenerator::new(strategy, rng));
    let stdout        = io::stdout();
    let mut writer    = BufWriter::new(stdout.lock());
    info!("Strategy: {:?}", strategy);

    match &args.f_name {
        Some(path) => {
            info!("Opening {:?}", path);
            let file = File::open(path).with_context(|| format!("Cannot open {:?}", path))?;
            run(BufReader::new(file), &mut writer, &mut sanitizer)?;
        }
        None => {
            info!("Reading standard input");
            run(io::stdin().lock(), &mut writer, &mut sanitizer)?;
        }
    }

    let stats = sanitizer.stats();
    info!("{} lines read, {} emitted, {} dropped, {} IPv4 and {} IPv6 addresses replaced",
        stats.lines_read, stats.lines_emitted, stats.lines_dropped, stats.ipv4_replaced, stats.ipv6_replaced);
    if args.report {
        eprintln!("{}", serde_json::to_string_pretty(stats)?);
    }

    Ok(())
}

// ─── Tests ────────────────────────────────────────────────────────────────────
