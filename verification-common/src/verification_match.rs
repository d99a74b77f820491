use super::{
    code_artifact_types::{CborAuxdata, ImmutableReferences, LinkReferences},
    compilation_artifacts::CompilationArtifacts,
    creation_code_artifacts::CreationCodeArtifacts,
    runtime_code_artifacts::RuntimeCodeArtifacts,
};
pub use super::{
    verification_match_transformations::Transformation as MatchTransformation,
    verification_match_values::Values as MatchValues,
};
use alloy_dyn_abi::JsonAbiExt;
use anyhow::{anyhow, Context};
use bytes::Bytes;
use serde::Deserialize;

/// The `PUSH20` opcode prepended by the compiler in front of the zeroed
/// own-address slot of library runtime code (call protection).
const PUSH20_OPCODE: u8 = 0x73;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Match {
    pub metadata_match: bool,
    pub transformations: Vec<MatchTransformation>,
    pub values: MatchValues,
}

pub fn verify_creation_code(
    on_chain_code: &[u8],
    compiled_code: Vec<u8>,
    creation_code_artifacts: &CreationCodeArtifacts,
    compilation_artifacts: &CompilationArtifacts,
) -> Result<Option<Match>, anyhow::Error> {
    let builder = MatchBuilder::new(on_chain_code, compiled_code);
    if let Some(builder) = builder {
        return Ok(builder
            .apply_creation_code_transformations(creation_code_artifacts, compilation_artifacts)?
            .verify_and_build());
    }
    Ok(None)
}

pub fn verify_runtime_code(
    on_chain_code: &[u8],
    compiled_code: Vec<u8>,
    runtime_code_artifacts: &RuntimeCodeArtifacts,
) -> Result<Option<Match>, anyhow::Error> {
    let builder = MatchBuilder::new(on_chain_code, compiled_code);
    if let Some(builder) = builder {
        return Ok(builder
            .apply_runtime_code_transformations(runtime_code_artifacts)?
            .verify_and_build());
    }
    Ok(None)
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MatchBuilder<'a> {
    deployed_code: &'a [u8],
    compiled_code: Vec<u8>,
    transformations: Vec<MatchTransformation>,
    values: MatchValues,
    invalid_constructor_arguments: bool,
    has_cbor_auxdata: bool,
    has_cbor_auxdata_transformation: bool,
}

impl<'a> MatchBuilder<'a> {
    pub fn new(deployed_code: &'a [u8], compiled_code: Vec<u8>) -> Option<Self> {
        if deployed_code.len() < compiled_code.len() {
            return None;
        }

        Some(Self {
            deployed_code,
            compiled_code,
            transformations: vec![],
            values: MatchValues::default(),
            invalid_constructor_arguments: false,
            has_cbor_auxdata: false,
            has_cbor_auxdata_transformation: false,
        })
    }

    pub fn set_has_cbor_auxdata(mut self, value: bool) -> Self {
        self.has_cbor_auxdata = value;
        self
    }

    pub fn apply_runtime_code_transformations(
        self,
        runtime_code_artifacts: &RuntimeCodeArtifacts,
    ) -> Result<Self, anyhow::Error> {
        self.apply_cbor_auxdata_transformations(runtime_code_artifacts.cbor_auxdata.as_ref())?
            .apply_library_transformations(runtime_code_artifacts.link_references.as_ref())?
            .apply_immutable_transformations(runtime_code_artifacts.immutable_references.as_ref())?
            .apply_call_protection_transformation()
    }

    pub fn apply_creation_code_transformations(
        self,
        creation_code_artifacts: &CreationCodeArtifacts,
        compilation_artifacts: &CompilationArtifacts,
    ) -> Result<Self, anyhow::Error> {
        self.apply_cbor_auxdata_transformations(creation_code_artifacts.cbor_auxdata.as_ref())?
            .apply_library_transformations(creation_code_artifacts.link_references.as_ref())?
            .apply_constructor_transformation(compilation_artifacts.abi.as_ref())
    }

    pub fn verify_and_build(self) -> Option<Match> {
        if !self.invalid_constructor_arguments
            && self.deployed_code == self.compiled_code.as_slice()
        {
            let metadata_match = self.has_cbor_auxdata && !self.has_cbor_auxdata_transformation;
            return Some(Match {
                metadata_match,
                transformations: self.transformations,
                values: self.values,
            });
        }

        None
    }

    fn apply_cbor_auxdata_transformations(
        mut self,
        cbor_auxdata: Option<&serde_json::Value>,
    ) -> Result<Self, anyhow::Error> {
        let cbor_auxdata = match cbor_auxdata {
            Some(value) => {
                CborAuxdata::deserialize(value).context("parsing cbor auxdata artifact")?
            }
            None => return Ok(self),
        };

        self.has_cbor_auxdata = !cbor_auxdata.is_empty();
        for (id, cbor_auxdata_value) in cbor_auxdata {
            let offset = cbor_auxdata_value.offset as usize;
            let re_compiled_value = cbor_auxdata_value.value.to_vec();

            let range = offset..offset + re_compiled_value.len();

            if self.compiled_code.len() < range.end {
                return Err(anyhow!("(reason=cbor_auxdata; id={id}) out of range"));
            }

            let on_chain_value = &self.deployed_code[range.clone()];
            if on_chain_value != re_compiled_value {
                self.has_cbor_auxdata_transformation = true;
                self.compiled_code.as_mut_slice()[range].copy_from_slice(on_chain_value);

                self.transformations
                    .push(MatchTransformation::auxdata(offset, &id));
                self.values
                    .add_cbor_auxdata(&id, Bytes::copy_from_slice(on_chain_value));
            }
        }

        Ok(self)
    }

    fn apply_library_transformations(
        mut self,
        link_references: Option<&serde_json::Value>,
    ) -> Result<Self, anyhow::Error> {
        let link_references = match link_references {
            Some(value) => {
                LinkReferences::deserialize(value).context("parsing link references artifact")?
            }
            None => return Ok(self),
        };

        for (file, file_references) in link_references {
            for (contract, offsets) in file_references {
                let id = format!("{file}:{contract}");
                let mut on_chain_value: Option<Vec<u8>> = None;
                for offset in offsets {
                    let start = offset.start as usize;
                    let end = start + offset.length as usize;
                    let range = start..end;

                    if self.compiled_code.len() < range.end {
                        return Err(anyhow!("(reason=link_reference; id={id}) out of range"));
                    }

                    let offset_value = &self.deployed_code[range.clone()];
                    match &on_chain_value {
                        None => {
                            on_chain_value = Some(offset_value.to_vec());
                        }
                        Some(on_chain_value) if on_chain_value != offset_value => {
                            return Err(anyhow!(
                                "(reason=link_reference; id={id}) offset values are not consistent"
                            ))
                        }
                        _ => {}
                    }

                    self.compiled_code.as_mut_slice()[range].copy_from_slice(offset_value);
                    self.transformations
                        .push(MatchTransformation::library(start, &id));
                    self.values
                        .add_library(&id, Bytes::copy_from_slice(offset_value));
                }
            }
        }

        Ok(self)
    }

    fn apply_immutable_transformations(
        mut self,
        immutable_references: Option<&serde_json::Value>,
    ) -> Result<Self, anyhow::Error> {
        let immutable_references = match immutable_references {
            Some(value) => ImmutableReferences::deserialize(value)
                .context("parsing immutable references artifact")?,
            None => return Ok(self),
        };

        for (id, offsets) in immutable_references {
            let mut on_chain_value: Option<Vec<u8>> = None;
            for offset in offsets {
                let start = offset.start as usize;
                let end = start + offset.length as usize;
                let range = start..end;

                if self.compiled_code.len() < range.end {
                    return Err(anyhow!("(reason=immutable_reference; id={id}) out of range"));
                }

                let offset_value = &self.deployed_code[range.clone()];
                match &on_chain_value {
                    None => {
                        on_chain_value = Some(offset_value.to_vec());
                    }
                    Some(on_chain_value) if on_chain_value != offset_value => {
                        return Err(anyhow!(
                            "(reason=immutable_reference; id={id}) offset values are not consistent"
                        ))
                    }
                    _ => {}
                }

                self.compiled_code.as_mut_slice()[range].copy_from_slice(offset_value);
                self.transformations
                    .push(MatchTransformation::immutable(start, &id));
                self.values
                    .add_immutable(&id, Bytes::copy_from_slice(offset_value));
            }
        }

        Ok(self)
    }

    /// Libraries compiled with call protection keep a zeroed own-address
    /// placeholder right after the leading `PUSH20`; on chain that slot holds
    /// the deployed address.
    fn apply_call_protection_transformation(mut self) -> Result<Self, anyhow::Error> {
        let range = 1..21;
        if self.compiled_code.len() < range.end
            || self.compiled_code[0] != PUSH20_OPCODE
            || self.compiled_code[range.clone()] != [0u8; 20]
        {
            return Ok(self);
        }

        let on_chain_value = &self.deployed_code[range.clone()];
        if on_chain_value != [0u8; 20] {
            self.compiled_code.as_mut_slice()[range].copy_from_slice(on_chain_value);
            self.transformations
                .push(MatchTransformation::call_protection(1));
            self.values
                .add_call_protection(Bytes::copy_from_slice(on_chain_value));
        }

        Ok(self)
    }

    fn apply_constructor_transformation(
        mut self,
        abi: Option<&serde_json::Value>,
    ) -> Result<Self, anyhow::Error> {
        let offset = self.compiled_code.len();
        let (_prefix, constructor_arguments) = self.deployed_code.split_at(offset);

        let constructor = match abi {
            Some(abi) => {
                alloy_json_abi::JsonAbi::deserialize(abi)
                    .context("parsing compiled contract abi")?
                    .constructor
            }
            None => None,
        };

        match constructor {
            None if !constructor_arguments.is_empty() => {
                self.invalid_constructor_arguments = true;
            }
            Some(_constructor) if constructor_arguments.is_empty() => {
                self.invalid_constructor_arguments = true;
            }
            Some(constructor)
                if constructor
                    .abi_decode_input(constructor_arguments, true)
                    .is_err() =>
            {
                self.invalid_constructor_arguments = true;
            }
            None => {}
            Some(_constructor) => {
                self.compiled_code.extend(constructor_arguments);
                self.transformations
                    .push(MatchTransformation::constructor(offset));
                self.values
                    .add_constructor_arguments(Bytes::copy_from_slice(constructor_arguments));
            }
        }

        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn auxdata_artifact(offset: usize, value: &[u8]) -> serde_json::Value {
        serde_json::json!({
            "1": { "offset": offset, "value": format!("0x{}", hex::encode(value)) }
        })
    }

    #[test]
    fn identical_codes_with_auxdata_produce_a_metadata_match() {
        let code = vec![0x60, 0x80, 0x60, 0x40, 0xaa, 0xbb, 0xcc, 0xdd];
        let artifacts = RuntimeCodeArtifacts {
            cbor_auxdata: Some(auxdata_artifact(4, &[0xaa, 0xbb, 0xcc, 0xdd])),
            ..Default::default()
        };

        let result = verify_runtime_code(&code, code.clone(), &artifacts)
            .unwrap()
            .expect("expected a match");
        assert!(result.metadata_match);
        assert!(result.transformations.is_empty());
    }

    #[test]
    fn differing_auxdata_is_transformed_into_a_partial_match() {
        let on_chain = vec![0x60, 0x80, 0x60, 0x40, 0x11, 0x22, 0x33, 0x44];
        let compiled = vec![0x60, 0x80, 0x60, 0x40, 0xaa, 0xbb, 0xcc, 0xdd];
        let artifacts = RuntimeCodeArtifacts {
            cbor_auxdata: Some(auxdata_artifact(4, &[0xaa, 0xbb, 0xcc, 0xdd])),
            ..Default::default()
        };

        let result = verify_runtime_code(&on_chain, compiled, &artifacts)
            .unwrap()
            .expect("expected a match");
        assert!(!result.metadata_match);
        assert_eq!(
            result.transformations,
            vec![MatchTransformation::auxdata(4, "1")]
        );
        assert_eq!(
            result.values.cbor_auxdata.get("1"),
            Some(&Bytes::from_static(&[0x11, 0x22, 0x33, 0x44]))
        );
    }

    #[test]
    fn library_placeholders_are_replaced_with_on_chain_addresses() {
        let mut on_chain = vec![0x60, 0x80];
        on_chain.extend([0x42; 20]);
        let mut compiled = vec![0x60, 0x80];
        compiled.extend([0x00; 20]);

        let artifacts = RuntimeCodeArtifacts {
            link_references: Some(serde_json::json!({
                "contracts/Lib.sol": { "Lib": [{ "start": 2, "length": 20 }] }
            })),
            ..Default::default()
        };

        let result = verify_runtime_code(&on_chain, compiled, &artifacts)
            .unwrap()
            .expect("expected a match");
        assert_eq!(
            result.transformations,
            vec![MatchTransformation::library(2, "contracts/Lib.sol:Lib")]
        );
        assert_eq!(
            result.values.libraries.get("contracts/Lib.sol:Lib"),
            Some(&Bytes::copy_from_slice(&[0x42; 20]))
        );
    }

    #[test]
    fn inconsistent_library_offsets_are_rejected() {
        let mut on_chain = vec![];
        on_chain.extend([0x42; 20]);
        on_chain.extend([0x43; 20]);
        let compiled = vec![0x00; 40];

        let artifacts = RuntimeCodeArtifacts {
            link_references: Some(serde_json::json!({
                "contracts/Lib.sol": {
                    "Lib": [
                        { "start": 0, "length": 20 },
                        { "start": 20, "length": 20 },
                    ]
                }
            })),
            ..Default::default()
        };

        verify_runtime_code(&on_chain, compiled, &artifacts).unwrap_err();
    }

    #[test]
    fn immutables_zeroed_by_the_compiler_are_filled_in() {
        let mut on_chain = vec![0x60, 0x80];
        on_chain.extend([0x07; 32]);
        let mut compiled = vec![0x60, 0x80];
        compiled.extend([0x00; 32]);

        let artifacts = RuntimeCodeArtifacts {
            immutable_references: Some(serde_json::json!({
                "2155": [{ "start": 2, "length": 32 }]
            })),
            ..Default::default()
        };

        let result = verify_runtime_code(&on_chain, compiled, &artifacts)
            .unwrap()
            .expect("expected a match");
        assert_eq!(
            result.transformations,
            vec![MatchTransformation::immutable(2, "2155")]
        );
    }

    #[test]
    fn call_protection_slot_is_replaced_with_the_deployed_address() {
        let mut on_chain = vec![PUSH20_OPCODE];
        on_chain.extend([0x99; 20]);
        on_chain.push(0x30);
        let mut compiled = vec![PUSH20_OPCODE];
        compiled.extend([0x00; 20]);
        compiled.push(0x30);

        let result = verify_runtime_code(&on_chain, compiled, &RuntimeCodeArtifacts::default())
            .unwrap()
            .expect("expected a match");
        assert_eq!(
            result.transformations,
            vec![MatchTransformation::call_protection(1)]
        );
        assert_eq!(
            result.values.call_protection,
            Some(Bytes::copy_from_slice(&[0x99; 20]))
        );
    }

    #[test]
    fn constructor_arguments_are_appended_when_the_abi_declares_them() {
        let compiled = vec![0x60, 0x80, 0x60, 0x40];
        let mut on_chain = compiled.clone();
        // abi-encoded uint256 argument
        let mut argument = vec![0u8; 31];
        argument.push(0x2a);
        on_chain.extend(&argument);

        let compilation_artifacts = CompilationArtifacts {
            abi: Some(serde_json::json!([{
                "type": "constructor",
                "inputs": [{ "name": "value", "type": "uint256", "internalType": "uint256" }],
                "stateMutability": "nonpayable",
            }])),
            ..Default::default()
        };

        let result = verify_creation_code(
            &on_chain,
            compiled,
            &CreationCodeArtifacts::default(),
            &compilation_artifacts,
        )
        .unwrap()
        .expect("expected a match");
        assert_eq!(
            result.transformations,
            vec![MatchTransformation::constructor(4)]
        );
        assert_eq!(
            result.values.constructor_arguments,
            Some(Bytes::from(argument))
        );
    }

    #[test]
    fn trailing_bytes_without_a_constructor_do_not_match() {
        let compiled = vec![0x60, 0x80, 0x60, 0x40];
        let mut on_chain = compiled.clone();
        on_chain.extend([0xde, 0xad]);

        let result = verify_creation_code(
            &on_chain,
            compiled,
            &CreationCodeArtifacts::default(),
            &CompilationArtifacts::default(),
        )
        .unwrap();
        assert_eq!(result, None);
    }

    #[test]
    fn deployed_code_shorter_than_compiled_code_never_matches() {
        let result = verify_runtime_code(
            &[0x60],
            vec![0x60, 0x80],
            &RuntimeCodeArtifacts::default(),
        )
        .unwrap();
        assert_eq!(result, None);
    }
}
