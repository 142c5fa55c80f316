use std::fmt;
use std::str::FromStr;

use crate::auxiliary::AuxRole;
use crate::error::MatmulError;

/// Fused post-processing applied to a matmul result in the same launch.
///
/// Forward epilogs that end in `_AUX` emit side data that the matching
/// derivative epilog (`DRELU*`, `DGELU*`) consumes in the backward pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Epilog {
    Default,
    Relu,
    ReluAux,
    Bias,
    ReluBias,
    ReluAuxBias,
    Gelu,
    GeluAux,
    GeluBias,
    GeluAuxBias,
    DRelu,
    DReluBGrad,
    DGelu,
    DGeluBGrad,
    BGradA,
    BGradB,
}

impl Epilog {
    pub const ALL: [Epilog; 16] = [
        Epilog::Default,
        Epilog::Relu,
        Epilog::ReluAux,
        Epilog::Bias,
        Epilog::ReluBias,
        Epilog::ReluAuxBias,
        Epilog::Gelu,
        Epilog::GeluAux,
        Epilog::GeluBias,
        Epilog::GeluAuxBias,
        Epilog::DRelu,
        Epilog::DReluBGrad,
        Epilog::DGelu,
        Epilog::DGeluBGrad,
        Epilog::BGradA,
        Epilog::BGradB,
    ];

    /// Canonical upper-case name, e.g. `RELU_AUX_BIAS`.
    pub fn name(&self) -> &'static str {
        match self {
            Epilog::Default => "DEFAULT",
            Epilog::Relu => "RELU",
            Epilog::ReluAux => "RELU_AUX",
            Epilog::Bias => "BIAS",
            Epilog::ReluBias => "RELU_BIAS",
            Epilog::ReluAuxBias => "RELU_AUX_BIAS",
            Epilog::Gelu => "GELU",
            Epilog::GeluAux => "GELU_AUX",
            Epilog::GeluBias => "GELU_BIAS",
            Epilog::GeluAuxBias => "GELU_AUX_BIAS",
            Epilog::DRelu => "DRELU",
            Epilog::DReluBGrad => "DRELU_BGRAD",
            Epilog::DGelu => "DGELU",
            Epilog::DGeluBGrad => "DGELU_BGRAD",
            Epilog::BGradA => "BGRADA",
            Epilog::BGradB => "BGRADB",
        }
    }

    /// Auxiliary roles that must be supplied as epilog inputs.
    pub fn requires(&self) -> &'static [AuxRole] {
        match self {
            Epilog::Bias
            | Epilog::ReluBias
            | Epilog::ReluAuxBias
            | Epilog::GeluBias
            | Epilog::GeluAuxBias => &[AuxRole::Bias],
            Epilog::DRelu | Epilog::DReluBGrad => &[AuxRole::ReluAux],
            Epilog::DGelu | Epilog::DGeluBGrad => &[AuxRole::GeluAux],
            Epilog::Default
            | Epilog::Relu
            | Epilog::ReluAux
            | Epilog::Gelu
            | Epilog::GeluAux
            | Epilog::BGradA
            | Epilog::BGradB => &[],
        }
    }

    /// Auxiliary roles this epilog produces alongside the result.
    pub fn emits(&self) -> &'static [AuxRole] {
        match self {
            Epilog::ReluAux | Epilog::ReluAuxBias => &[AuxRole::ReluAux],
            Epilog::GeluAux | Epilog::GeluAuxBias => &[AuxRole::GeluAux],
            Epilog::DReluBGrad | Epilog::DGeluBGrad | Epilog::BGradA | Epilog::BGradB => {
                &[AuxRole::BGrad]
            }
            Epilog::Default
            | Epilog::Relu
            | Epilog::Bias
            | Epilog::ReluBias
            | Epilog::Gelu
            | Epilog::GeluBias
            | Epilog::DRelu
            | Epilog::DGelu => &[],
        }
    }

    /// True for the derivative epilogs that consume a forward pass's side data.
    pub fn is_backward(&self) -> bool {
        matches!(
            self,
            Epilog::DRelu | Epilog::DReluBGrad | Epilog::DGelu | Epilog::DGeluBGrad
        )
    }

    /// Forward epilogs whose auxiliary output this epilog may consume.
    ///
    /// Empty for epilogs that consume no forward side data.
    pub fn paired_forward(&self) -> &'static [Epilog] {
        match self {
            Epilog::DRelu | Epilog::DReluBGrad => &[Epilog::ReluAux, Epilog::ReluAuxBias],
            Epilog::DGelu | Epilog::DGeluBGrad => &[Epilog::GeluAux, Epilog::GeluAuxBias],
            _ => &[],
        }
    }

    /// Whether a bundle produced by `producer` is a valid input for `self`.
    pub fn accepts_auxiliary_from(&self, producer: Epilog) -> bool {
        !self.is_backward() || self.paired_forward().contains(&producer)
    }
}

impl fmt::Display for Epilog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Epilog {
    type Err = MatmulError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_uppercase();
        Epilog::ALL
            .iter()
            .copied()
            .find(|e| e.name() == wanted)
            .ok_or_else(|| MatmulError::UnknownEpilog(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_roundtrip() {
        for epilog in Epilog::ALL {
            assert_eq!(epilog.name().parse::<Epilog>().unwrap(), epilog);
        }
        assert_eq!("relu_aux".parse::<Epilog>().unwrap(), Epilog::ReluAux);
    }

    #[test]
    fn test_unknown_name() {
        let err = "SWIGLU".parse::<Epilog>().unwrap_err();
        assert!(matches!(err, MatmulError::UnknownEpilog(ref s) if s == "SWIGLU"));
    }

    #[test]
    fn test_forward_emits_what_backward_requires() {
        for backward in Epilog::ALL.iter().filter(|e| e.is_backward()) {
            for forward in backward.paired_forward() {
                assert_eq!(forward.emits(), backward.requires());
            }
        }
    }

    #[test]
    fn test_bias_gradient_epilogs_emit_bgrad() {
        assert_eq!(Epilog::DReluBGrad.emits(), &[AuxRole::BGrad]);
        assert_eq!(Epilog::BGradA.emits(), &[AuxRole::BGrad]);
        assert!(Epilog::DRelu.emits().is_empty());
    }

    #[test]
    fn test_pairing_table() {
        assert!(Epilog::DRelu.accepts_auxiliary_from(Epilog::ReluAux));
        assert!(Epilog::DReluBGrad.accepts_auxiliary_from(Epilog::ReluAuxBias));
        assert!(!Epilog::DGelu.accepts_auxiliary_from(Epilog::ReluAux));
        assert!(Epilog::Bias.accepts_auxiliary_from(Epilog::GeluAux));
    }
}
