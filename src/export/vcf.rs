//! # VCF Sample Columns
//!
//! Writes the tab-prefixed sample columns of one VCF record: `GT` plus
//! whichever of `DS`, `HDS` and `GP` were switched on for the whole file.
//! The field set is decided once, before the header is written, from the
//! caller's options and what the source can provide; it never varies by
//! variant.
//!
//! Dosages print with the shortest round-trip decimal: diploid `DS` and `GP`
//! over 16384, haploid values and `HDS` haplotype dosages over 32768.

use crate::data::{VariantRecord, HET, HOM_FIRST, HOM_SECOND};
use crate::error::Result;
use crate::export::{EncodeScratch, FormatEncoder, VariantContext};
use crate::io::source::{DecodeFeatures, DosageProvenance, SourceInfo};
use crate::model::decimal::{write_fixed, write_requantized_16384, DOSAGE_DENOM, HAPLOID_DENOM, MAX_WIDTH};

/// Which dosage fields to export
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum VcfDosageMode {
    /// Hardcalls only
    #[default]
    None,
    /// `DS` when the source has dosages
    Ds,
    /// `DS` and `HDS` when the source has phased dosages
    Hds,
    /// `DS` always
    DsForce,
    /// `DS` and `HDS` always
    HdsForce,
}

/// FORMAT fields after `GT`
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct VcfFields {
    pub ds: bool,
    pub hds: bool,
    pub gp: bool,
}

impl VcfFields {
    /// Decide the field set for a whole export
    pub fn decide(mode: VcfDosageMode, gp: bool, info: &SourceInfo) -> Self {
        let phased_dosage = info.has_dosage && (info.has_phase || info.has_dosage_phase);
        let (ds, hds) = match mode {
            VcfDosageMode::None => (false, false),
            VcfDosageMode::Ds => (info.has_dosage, false),
            VcfDosageMode::Hds => (info.has_dosage, phased_dosage),
            VcfDosageMode::DsForce => (true, false),
            VcfDosageMode::HdsForce => (true, true),
        };
        Self { ds, hds, gp }
    }

    /// The FORMAT column
    pub fn format_key(&self) -> String {
        let mut key = String::from("GT");
        if self.ds {
            key.push_str(":DS");
        }
        if self.hds {
            key.push_str(":HDS");
        }
        if self.gp {
            key.push_str(":GP");
        }
        key
    }

    pub fn any_dosage(&self) -> bool {
        self.ds || self.hds || self.gp
    }
}

/// VCF sample column encoder
#[derive(Clone, Debug)]
pub struct VcfEncoder {
    fields: VcfFields,
    requantized: bool,
}

impl VcfEncoder {
    pub fn new(fields: VcfFields, provenance: DosageProvenance) -> Self {
        Self {
            fields,
            requantized: provenance == DosageProvenance::Bgen11,
        }
    }

    pub fn fields(&self) -> VcfFields {
        self.fields
    }

    #[inline]
    fn write_dosage(&self, d: u32, out: &mut Vec<u8>) {
        if self.requantized {
            write_requantized_16384(d, out);
        } else {
            write_fixed(d, DOSAGE_DENOM, out);
        }
    }

    fn write_gt(code: u8, ploidy: u8, phase: Option<bool>, hom_sep: u8, out: &mut Vec<u8>) {
        if ploidy == 1 {
            match code {
                HOM_FIRST => out.push(b'0'),
                HOM_SECOND => out.push(b'1'),
                HET => out.extend_from_slice(b"0/1"),
                _ => out.push(b'.'),
            }
            return;
        }
        match (code, phase) {
            (HOM_FIRST, _) => out.extend_from_slice(&[b'0', hom_sep, b'0']),
            (HET, Some(false)) => out.extend_from_slice(b"0|1"),
            (HET, Some(true)) => out.extend_from_slice(b"1|0"),
            (HET, None) => out.extend_from_slice(b"0/1"),
            (HOM_SECOND, _) => out.extend_from_slice(&[b'1', hom_sep, b'1']),
            _ => out.extend_from_slice(b"./."),
        }
    }

    fn write_ds(&self, code: u8, ploidy: u8, dosage: Option<u16>, out: &mut Vec<u8>) {
        match (dosage, ploidy) {
            (Some(d), 1) => write_fixed(d as u32, HAPLOID_DENOM, out),
            (Some(d), _) => self.write_dosage(d as u32, out),
            (None, _) => out.extend_from_slice(match (code, ploidy) {
                (HOM_FIRST, _) => b"0",
                (HET, 1) => b"0.5",
                (HET, _) => b"1",
                (HOM_SECOND, 1) => b"1",
                (HOM_SECOND, _) => b"2",
                _ => b".",
            }),
        }
    }

    fn write_hds(
        &self,
        code: u8,
        ploidy: u8,
        phase: Option<bool>,
        dosage: Option<(u16, Option<i16>)>,
        out: &mut Vec<u8>,
    ) {
        if ploidy == 1 {
            self.write_ds(code, 1, dosage.map(|(d, _)| d), out);
            return;
        }
        match dosage {
            Some((d, dphase)) => {
                let d = d as i32;
                let delta = match (dphase, phase) {
                    (Some(delta), _) => delta as i32,
                    (None, Some(orientation)) => {
                        let m = d.min(32768 - d);
                        if orientation {
                            m
                        } else {
                            -m
                        }
                    }
                    (None, None) => 0,
                };
                write_fixed((d + delta) as u32, HAPLOID_DENOM, out);
                out.push(b',');
                write_fixed((d - delta) as u32, HAPLOID_DENOM, out);
            }
            None => out.extend_from_slice(match (code, phase) {
                (HOM_FIRST, _) => b"0,0",
                (HET, Some(true)) => b"1,0",
                (HET, Some(false)) => b"0,1",
                (HET, None) => b"0.5,0.5",
                (HOM_SECOND, _) => b"1,1",
                _ => b".",
            }),
        }
    }

    fn write_gp(code: u8, ploidy: u8, dosage: Option<u16>, out: &mut Vec<u8>) {
        match (dosage, ploidy) {
            (Some(d), 1) => {
                write_fixed(32768 - d as u32, HAPLOID_DENOM, out);
                out.push(b',');
                write_fixed(d as u32, HAPLOID_DENOM, out);
            }
            (Some(d), _) => write_probs_16384(d, b',', out),
            (None, 1) => out.extend_from_slice(match code {
                HOM_FIRST => b"1,0",
                HET => b"0.5,0.5",
                HOM_SECOND => b"0,1",
                _ => b".",
            }),
            (None, _) => out.extend_from_slice(match code {
                HOM_FIRST => b"1,0,0",
                HET => b"0,1,0",
                HOM_SECOND => b"0,0,1",
                _ => b".",
            }),
        }
    }
}

/// Write the three diploid genotype probabilities of dosage `d`, over 16384
pub(crate) fn write_probs_16384(d: u16, sep: u8, out: &mut Vec<u8>) {
    let d = d as u32;
    let probs = if d <= 16384 {
        [16384 - d, d, 0]
    } else {
        [0, 32768 - d, d - 16384]
    };
    write_fixed(probs[0], DOSAGE_DENOM, out);
    out.push(sep);
    write_fixed(probs[1], DOSAGE_DENOM, out);
    out.push(sep);
    write_fixed(probs[2], DOSAGE_DENOM, out);
}

impl FormatEncoder for VcfEncoder {
    fn name(&self) -> &'static str {
        "vcf"
    }

    fn required_decode_features(&self) -> DecodeFeatures {
        DecodeFeatures {
            phase: true,
            dosage: self.fields.any_dosage(),
            multiallelic: true,
        }
    }

    fn alt_first(&self) -> bool {
        false
    }

    fn max_encoded_len(&self, sample_ct: usize) -> usize {
        let mut per_sample = 4;
        if self.fields.ds {
            per_sample += 1 + MAX_WIDTH;
        }
        if self.fields.hds {
            per_sample += 2 + 2 * MAX_WIDTH;
        }
        if self.fields.gp {
            per_sample += 3 + 3 * MAX_WIDTH;
        }
        sample_ct * per_sample
    }

    fn encode_variant(
        &self,
        vctx: &VariantContext<'_>,
        record: &VariantRecord,
        _scratch: &mut EncodeScratch,
        out: &mut Vec<u8>,
    ) -> Result<()> {
        let g = &record.genotypes;
        let hom_sep = if g.phase.any() { b'|' } else { b'/' };
        let mut cursor = record.dosage.cursor();
        for s in 0..record.sample_ct() {
            let ploidy = vctx.ploidy.sample_ploidy(vctx.sexes[s]);
            let code = g.code(s);
            let phase = g.phase_of(s);
            let dosage = cursor.next_for(s);
            out.push(b'\t');
            if ploidy == 0 {
                out.push(b'.');
                continue;
            }
            Self::write_gt(code, ploidy, phase, hom_sep, out);
            if self.fields.ds {
                out.push(b':');
                self.write_ds(code, ploidy, dosage.map(|e| e.value), out);
            }
            if self.fields.hds {
                out.push(b':');
                self.write_hds(code, ploidy, phase, dosage.map(|e| (e.value, e.dphase)), out);
            }
            if self.fields.gp {
                out.push(b':');
                Self::write_gp(code, ploidy, dosage.map(|e| e.value), out);
            }
        }
        Ok(())
    }
}
