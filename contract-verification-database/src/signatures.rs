use crate::{
    helpers::insert_then_select,
    types::{SignatureRecord, SignatureView},
};
use anyhow::Context;
use contract_verification_entity::{compiled_contracts_signatures, signatures};
use sea_orm::{
    prelude::Uuid, ActiveValue::Set, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter,
};

const SELECTOR_PREFIX_LENGTH: usize = 4;
const FULL_HASH_LENGTH: usize = 32;

/// Inserts the extracted signatures and their per-compilation join rows.
/// Both inserts are idempotent, so re-verifying a compilation does not
/// produce duplicates.
pub async fn insert_signatures<C: ConnectionTrait>(
    database_connection: &C,
    compilation_id: Uuid,
    records: &[SignatureRecord],
) -> Result<(), anyhow::Error> {
    for record in records {
        let signature_hash_4 = record
            .signature_hash
            .get(..SELECTOR_PREFIX_LENGTH)
            .ok_or(anyhow::anyhow!(
                "signature hash is shorter than the selector prefix: signature={}",
                record.signature
            ))?
            .to_vec();

        let active_model = signatures::ActiveModel {
            id: Default::default(),
            signature_hash: Set(record.signature_hash.clone()),
            signature_hash_4: Set(signature_hash_4),
            signature: Set(record.signature.clone()),
            created_at: Default::default(),
        };
        let (_model, _inserted) = insert_then_select(
            database_connection,
            signatures::Entity,
            active_model,
            [(
                signatures::Column::SignatureHash,
                record.signature_hash.clone().into(),
            )],
        )
        .await
        .context("insert signature")?;

        let join_model = compiled_contracts_signatures::ActiveModel {
            id: Default::default(),
            compilation_id: Set(compilation_id),
            signature_hash: Set(record.signature_hash.clone()),
            signature_type: Set(record.kind.into()),
        };
        let (_model, _inserted) = insert_then_select(
            database_connection,
            compiled_contracts_signatures::Entity,
            join_model,
            [
                (
                    compiled_contracts_signatures::Column::CompilationId,
                    compilation_id.into(),
                ),
                (
                    compiled_contracts_signatures::Column::SignatureHash,
                    record.signature_hash.clone().into(),
                ),
                (
                    compiled_contracts_signatures::Column::SignatureType,
                    record.kind.to_string().into(),
                ),
            ],
        )
        .await
        .context("insert compiled contract signature")?;
    }

    Ok(())
}

/// Looks up signatures by the full 32-byte keccak hash or by its 4-byte
/// prefix. Prefix collisions are expected; all colliding rows are returned.
pub async fn find_signatures<C: ConnectionTrait>(
    database_connection: &C,
    signature_hash: &[u8],
) -> Result<Vec<SignatureView>, anyhow::Error> {
    let query = match signature_hash.len() {
        FULL_HASH_LENGTH => signatures::Entity::find()
            .filter(signatures::Column::SignatureHash.eq(signature_hash.to_vec())),
        SELECTOR_PREFIX_LENGTH => signatures::Entity::find()
            .filter(signatures::Column::SignatureHash4.eq(signature_hash.to_vec())),
        invalid => {
            return Err(anyhow::anyhow!(
                "signature hash must be {FULL_HASH_LENGTH} or {SELECTOR_PREFIX_LENGTH} bytes long, got {invalid}"
            ))
        }
    };

    let models = query
        .all(database_connection)
        .await
        .context("select from \"signatures\"")?;

    Ok(models
        .into_iter()
        .map(|model| SignatureView {
            signature: model.signature,
            signature_hash: model.signature_hash,
            signature_hash_4: model.signature_hash_4,
        })
        .collect())
}

/// Signatures attached to the given compilation, in insertion-id order.
pub async fn find_signatures_by_compilation<C: ConnectionTrait>(
    database_connection: &C,
    compilation_id: Uuid,
) -> Result<Vec<SignatureView>, anyhow::Error> {
    let joined = compiled_contracts_signatures::Entity::find()
        .filter(compiled_contracts_signatures::Column::CompilationId.eq(compilation_id))
        .find_also_related(signatures::Entity)
        .all(database_connection)
        .await
        .context("select from \"compiled_contracts_signatures\" joined with \"signatures\"")?;

    let mut views = Vec::with_capacity(joined.len());
    for (join_row, signature) in joined {
        let signature = signature.ok_or(anyhow::anyhow!(
            "signature was not found, though referenced: hash={}",
            hex::encode(&join_row.signature_hash)
        ))?;
        views.push(SignatureView {
            signature: signature.signature,
            signature_hash: signature.signature_hash,
            signature_hash_4: signature.signature_hash_4,
        });
    }

    Ok(views)
}
