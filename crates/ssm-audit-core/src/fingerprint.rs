//! Deterministic policy fingerprint.
//!
//! The policy is rendered as canonical JSON (sorted keys, no whitespace,
//! ASCII-only escapes) and hashed. Float rendering follows the shortest
//! round-trip repr used by existing audit outputs: positional notation for
//! decimal exponents in `[-4, 16)`, otherwise `d.ddde±XX` with at least two
//! exponent digits. The open lower band is written as `-Infinity`.
//!
//! With the default policy this yields
//! `33a9544c5a40d3dfb2c6116b26919244fade99d0d1c4171da1104b26b67de945`.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use crate::policy::{HashAlg, Policy};

const DIVISION_POLICY: &str = "strict";
const MAPPINGS: &str = "mini_calc";

/// Minimal JSON value with a deterministic writer.
#[derive(Debug, Clone, PartialEq)]
pub enum CanonicalValue {
    Number(f64),
    Str(String),
    Object(BTreeMap<String, CanonicalValue>),
}

impl CanonicalValue {
    fn object<const N: usize>(pairs: [(&str, CanonicalValue); N]) -> Self {
        Self::Object(pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect())
    }

    /// Compact canonical rendering.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        self.write_into(&mut out);
        out
    }

    fn write_into(&self, out: &mut String) {
        match self {
            Self::Number(x) => push_float(out, *x),
            Self::Str(s) => push_string(out, s),
            Self::Object(map) => {
                out.push('{');
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    push_string(out, k);
                    out.push(':');
                    v.write_into(out);
                }
                out.push('}');
            }
        }
    }
}

/// The knob document hashed into the fingerprint.
#[must_use]
pub fn policy_document(policy: &Policy) -> CanonicalValue {
    use CanonicalValue::{Number, Str};
    let cuts = &policy.cuts;
    CanonicalValue::object([
        (
            "bands",
            CanonicalValue::object([
                ("A++", Number(cuts.strong_aligned)),
                ("A+", Number(cuts.aligned)),
                ("A0", Number(cuts.neutral)),
                ("A-", Number(cuts.misaligned)),
                ("A--", Number(f64::NEG_INFINITY)),
            ]),
        ),
        ("division_policy", Str(DIVISION_POLICY.to_string())),
        ("eps_a", Number(policy.eps_a)),
        ("eps_w", Number(policy.eps_w)),
        ("gamma", Number(policy.gamma)),
        (
            "hysteresis",
            CanonicalValue::object([
                ("promote", Number(policy.promote)),
                ("demote", Number(policy.demote)),
            ]),
        ),
        ("mappings", Str(MAPPINGS.to_string())),
    ])
}

#[must_use]
pub fn canonical_policy_json(policy: &Policy) -> String {
    policy_document(policy).render()
}

/// Hex digest of the canonical policy document under `policy.hash_alg`.
#[must_use]
pub fn fingerprint(policy: &Policy) -> String {
    to_hex(&hash_256(
        policy.hash_alg,
        canonical_policy_json(policy).as_bytes(),
    ))
}

#[must_use]
pub fn hash_256(alg: HashAlg, bytes: &[u8]) -> [u8; 32] {
    match alg {
        HashAlg::Blake3 => *blake3::hash(bytes).as_bytes(),
        HashAlg::Sha256 => {
            use sha2::Digest as _;
            let mut hasher = sha2::Sha256::new();
            hasher.update(bytes);
            let out = hasher.finalize();
            let mut arr = [0u8; 32];
            arr.copy_from_slice(&out);
            arr
        }
    }
}

#[must_use]
pub fn to_hex(bytes: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for &b in bytes {
        out.push(HEX[(b >> 4) as usize] as char);
        out.push(HEX[(b & 0x0f) as usize] as char);
    }
    out
}

/// Shortest round-trip float text, exponent form outside `[1e-4, 1e16)`.
fn push_float(out: &mut String, x: f64) {
    if x.is_nan() {
        out.push_str("NaN");
        return;
    }
    if x.is_infinite() {
        out.push_str(if x > 0.0 { "Infinity" } else { "-Infinity" });
        return;
    }
    let sci = format!("{x:e}");
    let (mantissa, exp) = sci.split_once('e').unwrap_or((sci.as_str(), "0"));
    let exp: i32 = exp.parse().unwrap_or(0);
    if (-4..16).contains(&exp) {
        let positional = x.to_string();
        out.push_str(&positional);
        if !positional.contains('.') {
            out.push_str(".0");
        }
    } else {
        let sign = if exp < 0 { '-' } else { '+' };
        let _ = write!(out, "{mantissa}e{sign}{:02}", exp.unsigned_abs());
    }
}

fn push_string(out: &mut String, s: &str) {
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{08}' => out.push_str("\\b"),
            '\u{0c}' => out.push_str("\\f"),
            c if c.is_ascii() && !c.is_ascii_control() => out.push(c),
            c => {
                let mut buf = [0u16; 2];
                for unit in c.encode_utf16(&mut buf) {
                    let _ = write!(out, "\\u{unit:04x}");
                }
            }
        }
    }
    out.push('"');
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::band::BandCuts;

    const DEFAULT_DOC: &str = r#"{"bands":{"A+":0.5,"A++":0.75,"A-":0.1,"A--":-Infinity,"A0":0.25},"division_policy":"strict","eps_a":1e-06,"eps_w":1e-12,"gamma":1.0,"hysteresis":{"demote":-0.05,"promote":0.05},"mappings":"mini_calc"}"#;

    fn float(x: f64) -> String {
        let mut s = String::new();
        push_float(&mut s, x);
        s
    }

    #[test]
    fn default_document_is_canonical() {
        assert_eq!(canonical_policy_json(&Policy::default()), DEFAULT_DOC);
    }

    #[test]
    fn default_fingerprint_matches_reference_hash() {
        assert_eq!(
            fingerprint(&Policy::default()),
            "33a9544c5a40d3dfb2c6116b26919244fade99d0d1c4171da1104b26b67de945"
        );
    }

    #[test]
    fn promote_change_changes_fingerprint() {
        let p = Policy::default().with_hysteresis(0.1, -0.05);
        assert_eq!(
            fingerprint(&p),
            "67ad3f0872518fea0dbbbb0de550e9379e8a89282a76a32bc06d83f314b68c95"
        );
    }

    #[test]
    fn every_fingerprinted_knob_matters() {
        let base = fingerprint(&Policy::default());
        let variants = [
            Policy::default().with_eps_a(2e-6),
            Policy::default().with_eps_w(1e-10),
            Policy::default().with_gamma(1.5),
            Policy::default().with_hysteresis(0.05, -0.06),
            Policy::default().with_cuts(BandCuts {
                misaligned: 0.12,
                ..BandCuts::DEFAULT
            }),
            Policy::default().with_cuts(BandCuts {
                neutral: 0.3,
                ..BandCuts::DEFAULT
            }),
            Policy::default().with_cuts(BandCuts {
                aligned: 0.55,
                ..BandCuts::DEFAULT
            }),
            Policy::default().with_cuts(BandCuts {
                strong_aligned: 0.8,
                ..BandCuts::DEFAULT
            }),
        ];
        let mut seen = vec![base.clone()];
        for p in variants {
            let hash = fingerprint(&p);
            assert!(!seen.contains(&hash), "{p:?}");
            seen.push(hash);
        }
        assert_eq!(
            fingerprint(&Policy::default().with_slope_7d(-0.5)),
            base,
            "slope_7d is an alert knob, not a fingerprinted one"
        );
    }

    #[test]
    fn fingerprint_ignores_builder_order() {
        let cuts = BandCuts {
            neutral: 0.3,
            ..BandCuts::DEFAULT
        };
        let first = Policy::default()
            .with_gamma(0.3)
            .with_cuts(cuts)
            .with_hysteresis(0.1, -0.1)
            .with_eps_a(1e-5);
        let second = Policy::default()
            .with_eps_a(1e-5)
            .with_hysteresis(0.1, -0.1)
            .with_cuts(cuts)
            .with_gamma(0.3);
        assert_eq!(canonical_policy_json(&first), canonical_policy_json(&second));
        assert_eq!(fingerprint(&first), fingerprint(&second));
        assert_ne!(fingerprint(&first), fingerprint(&Policy::default()));
        assert_eq!(fingerprint(&first).len(), 64);
    }

    #[test]
    fn blake3_hashes_the_same_bytes() {
        let p = Policy::default().with_hash_alg(HashAlg::Blake3);
        let expected = blake3::hash(DEFAULT_DOC.as_bytes()).to_hex().to_string();
        assert_eq!(fingerprint(&p), expected);
        assert_ne!(fingerprint(&p), fingerprint(&Policy::default()));
    }

    #[test]
    fn floats_follow_shortest_repr() {
        assert_eq!(float(1.0), "1.0");
        assert_eq!(float(0.0), "0.0");
        assert_eq!(float(-0.0), "-0.0");
        assert_eq!(float(0.05), "0.05");
        assert_eq!(float(-0.05), "-0.05");
        assert_eq!(float(0.0001), "0.0001");
        assert_eq!(float(0.00001), "1e-05");
        assert_eq!(float(1e-6), "1e-06");
        assert_eq!(float(1.5e-7), "1.5e-07");
        assert_eq!(float(1e-12), "1e-12");
        assert_eq!(float(123.25), "123.25");
        assert_eq!(float(1e15), "1000000000000000.0");
        assert_eq!(float(1e16), "1e+16");
        assert_eq!(float(2.5e100), "2.5e+100");
        assert_eq!(float(f64::NEG_INFINITY), "-Infinity");
    }

    #[test]
    fn strings_escape_to_ascii() {
        let mut s = String::new();
        push_string(&mut s, "a\"b\\c\né");
        assert_eq!(s, r#""a\"b\\c\n\u00e9""#);
    }
}
