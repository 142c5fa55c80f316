use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use epimat_tensor::Tensor;

use crate::epilog::Epilog;
use crate::error::{MatmulError, Result};

/// Name of an auxiliary tensor threaded between epilogs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AuxRole {
    /// Per-row bias added before the activation.
    Bias,
    /// Mask of positive pre-activation values, emitted by `RELU_AUX*`.
    ReluAux,
    /// Pre-activation values, emitted by `GELU_AUX*`.
    GeluAux,
    /// Bias gradient, emitted by the `*BGRAD*` epilogs.
    BGrad,
}

impl AuxRole {
    pub const ALL: [AuxRole; 4] = [AuxRole::Bias, AuxRole::ReluAux, AuxRole::GeluAux, AuxRole::BGrad];

    pub fn name(&self) -> &'static str {
        match self {
            AuxRole::Bias => "bias",
            AuxRole::ReluAux => "relu_aux",
            AuxRole::GeluAux => "gelu_aux",
            AuxRole::BGrad => "bgrad",
        }
    }
}

impl fmt::Display for AuxRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for AuxRole {
    type Err = MatmulError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        AuxRole::ALL
            .iter()
            .copied()
            .find(|r| r.name() == s)
            .ok_or_else(|| MatmulError::UnknownAuxRole(s.to_string()))
    }
}

/// Named auxiliary tensors, keyed by role.
///
/// Bundles returned by the facade remember which epilog produced them so a
/// later backward call can check the pairing when asked to.
#[derive(Debug, Clone, Default)]
pub struct AuxiliaryBundle {
    entries: BTreeMap<AuxRole, Tensor>,
    producer: Option<Epilog>,
}

impl AuxiliaryBundle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, role: AuxRole, tensor: Tensor) -> Self {
        self.entries.insert(role, tensor);
        self
    }

    pub fn insert(&mut self, role: AuxRole, tensor: Tensor) -> Option<Tensor> {
        self.entries.insert(role, tensor)
    }

    /// Insert by role name (`"bias"`, `"relu_aux"`, ...).
    ///
    /// # Errors
    /// Returns `UnknownAuxRole` for names outside the closed role set.
    pub fn insert_named(&mut self, name: &str, tensor: Tensor) -> Result<Option<Tensor>> {
        let role = name.parse::<AuxRole>()?;
        Ok(self.entries.insert(role, tensor))
    }

    pub fn get(&self, role: AuxRole) -> Option<&Tensor> {
        self.entries.get(&role)
    }

    pub fn get_named(&self, name: &str) -> Option<&Tensor> {
        name.parse::<AuxRole>().ok().and_then(|role| self.get(role))
    }

    pub fn contains(&self, role: AuxRole) -> bool {
        self.entries.contains_key(&role)
    }

    pub fn remove(&mut self, role: AuxRole) -> Option<Tensor> {
        self.entries.remove(&role)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn roles(&self) -> impl Iterator<Item = AuxRole> + '_ {
        self.entries.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (AuxRole, &Tensor)> + '_ {
        self.entries.iter().map(|(role, t)| (*role, t))
    }

    /// The epilog that emitted this bundle, if it came out of the facade.
    pub fn producer(&self) -> Option<Epilog> {
        self.producer
    }

    pub(crate) fn with_producer(mut self, producer: Epilog) -> Self {
        self.producer = Some(producer);
        self
    }

    /// Unwrap a single-entry bundle into its tensor.
    pub fn into_single(self) -> Option<Tensor> {
        if self.entries.len() != 1 {
            return None;
        }
        self.entries.into_values().next()
    }
}

/// What a caller may pass as epilog inputs.
#[derive(Debug, Clone, Default)]
pub enum EpilogInputs {
    #[default]
    None,
    /// A bare tensor, bound to the epilog's only required role.
    Single(Tensor),
    Bundle(AuxiliaryBundle),
}

impl EpilogInputs {
    /// Resolve into a bundle keyed by role for `epilog`.
    pub(crate) fn into_bundle(self, epilog: Epilog) -> Result<AuxiliaryBundle> {
        match self {
            EpilogInputs::None => Ok(AuxiliaryBundle::new()),
            EpilogInputs::Bundle(bundle) => Ok(bundle),
            EpilogInputs::Single(tensor) => match epilog.requires() {
                [role] => Ok(AuxiliaryBundle::new().with(*role, tensor)),
                _ => Err(MatmulError::UnexpectedAuxiliaryInput {
                    epilog,
                    role: "<unnamed tensor>".to_string(),
                }),
            },
        }
    }
}

impl From<Tensor> for EpilogInputs {
    fn from(tensor: Tensor) -> Self {
        EpilogInputs::Single(tensor)
    }
}

impl From<AuxiliaryBundle> for EpilogInputs {
    fn from(bundle: AuxiliaryBundle) -> Self {
        EpilogInputs::Bundle(bundle)
    }
}

impl<T: Into<EpilogInputs>> From<Option<T>> for EpilogInputs {
    fn from(value: Option<T>) -> Self {
        value.map_or(EpilogInputs::None, Into::into)
    }
}

impl From<()> for EpilogInputs {
    fn from(_: ()) -> Self {
        EpilogInputs::None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use epimat_tensor::DType;

    #[test]
    fn test_role_names() {
        for role in AuxRole::ALL {
            assert_eq!(role.name().parse::<AuxRole>().unwrap(), role);
        }
        assert!("mask".parse::<AuxRole>().is_err());
    }

    #[test]
    fn test_insert_named() {
        let mut bundle = AuxiliaryBundle::new();
        bundle
            .insert_named("bias", Tensor::zeros([4, 1], DType::F32))
            .unwrap();
        assert!(bundle.contains(AuxRole::Bias));
        assert!(bundle.get_named("bias").is_some());

        let err = bundle
            .insert_named("scale", Tensor::zeros([1], DType::F32))
            .unwrap_err();
        assert!(matches!(err, MatmulError::UnknownAuxRole(_)));
        assert_eq!(bundle.len(), 1);
    }

    #[test]
    fn test_into_single() {
        let t = Tensor::zeros([2, 2], DType::U8);
        let bundle = AuxiliaryBundle::new().with(AuxRole::ReluAux, t.clone());
        assert!(bundle.into_single().unwrap().same_buffer(&t));

        let two = AuxiliaryBundle::new()
            .with(AuxRole::ReluAux, t.clone())
            .with(AuxRole::Bias, t);
        assert!(two.into_single().is_none());
    }

    #[test]
    fn test_single_binds_to_required_role() {
        let bias = Tensor::zeros([4, 1], DType::F32);
        let bundle = EpilogInputs::from(bias)
            .into_bundle(Epilog::ReluAuxBias)
            .unwrap();
        assert_eq!(bundle.roles().collect::<Vec<_>>(), vec![AuxRole::Bias]);
    }

    #[test]
    fn test_single_without_required_role() {
        let t = Tensor::zeros([4, 1], DType::F32);
        let err = EpilogInputs::from(t).into_bundle(Epilog::Relu).unwrap_err();
        assert!(matches!(err, MatmulError::UnexpectedAuxiliaryInput { .. }));
    }

    #[test]
    fn test_from_option() {
        let none: Option<Tensor> = None;
        assert!(matches!(EpilogInputs::from(none), EpilogInputs::None));
        assert!(matches!(EpilogInputs::from(()), EpilogInputs::None));
    }
}
