use crate::{internal, types::SimilarityCandidate};
use anyhow::Context;
use contract_verification_entity::verified_contracts;
use sea_orm::{
    prelude::Uuid, ColumnTrait, ConnectionTrait, EntityTrait, FromQueryResult, QueryFilter,
    QueryOrder, Statement,
};

/// How many leading bytes form the retrieval bucket. Candidates agreeing with
/// the remote code on this prefix are fetched and ranked by the exact shared
/// prefix afterwards.
const PREFIX_BUCKET_BYTES: usize = 64;

#[derive(Debug, FromQueryResult)]
struct CompilationCandidate {
    compilation_id: Uuid,
}

pub fn longest_common_prefix(lhs: &[u8], rhs: &[u8]) -> usize {
    lhs.iter().zip(rhs.iter()).take_while(|(a, b)| a == b).count()
}

/// Returns up to `limit` previously verified compilations whose stored
/// runtime bytecode shares the longest prefix with the given code; ties are
/// broken by the most recent verification.
pub async fn find_similarity_candidates<C: ConnectionTrait>(
    database_connection: &C,
    runtime_code: &[u8],
    limit: usize,
) -> Result<Vec<SimilarityCandidate>, anyhow::Error> {
    if runtime_code.is_empty() {
        return Ok(vec![]);
    }

    let bucket_bytes = runtime_code.len().min(PREFIX_BUCKET_BYTES);
    let prefix_hex = hex::encode(&runtime_code[..bucket_bytes]);

    let candidate_ids = CompilationCandidate::find_by_statement(Statement::from_sql_and_values(
        database_connection.get_database_backend(),
        r#"
        SELECT DISTINCT cc.id AS compilation_id
        FROM compiled_contracts cc
        JOIN code c ON c.code_hash = cc.runtime_code_hash
        JOIN verified_contracts vc ON vc.compilation_id = cc.id
        WHERE c.code IS NOT NULL
        AND substr(encode(c.code, 'hex'), 1, $1) = $2;"#,
        vec![(prefix_hex.len() as i32).into(), prefix_hex.into()],
    ))
    .all(database_connection)
    .await
    .context("select similarity candidates")?;

    let mut candidates = Vec::new();
    for candidate in candidate_ids {
        let compiled_contract =
            match internal::retrieve_compiled_contract_by_id(database_connection, candidate.compilation_id)
                .await?
            {
                Some(model) => model,
                None => continue,
            };

        let stored_runtime_code = internal::retrieve_code_by_id(
            database_connection,
            compiled_contract.runtime_code_hash.clone(),
        )
        .await?
        .code
        .ok_or(anyhow::anyhow!(
            "compiled contract references missing runtime code: compilation_id={}",
            compiled_contract.id
        ))?;
        let stored_creation_code = internal::retrieve_code_by_id(
            database_connection,
            compiled_contract.creation_code_hash.clone(),
        )
        .await?
        .code;

        let sources =
            internal::retrieve_sources_by_compilation_id(database_connection, compiled_contract.id)
                .await?;

        let last_verified = verified_contracts::Entity::find()
            .filter(verified_contracts::Column::CompilationId.eq(compiled_contract.id))
            .order_by_desc(verified_contracts::Column::CreatedAt)
            .one(database_connection)
            .await
            .context("select latest verified contract for compilation")?
            .ok_or(anyhow::anyhow!(
                "candidate compilation without verified contracts: compilation_id={}",
                compiled_contract.id
            ))?;

        let shared_prefix_len = longest_common_prefix(runtime_code, &stored_runtime_code);
        candidates.push(SimilarityCandidate {
            compiled_contract,
            creation_code: stored_creation_code,
            runtime_code: stored_runtime_code,
            sources,
            shared_prefix_len,
            last_verified_at: last_verified.created_at,
        });
    }

    candidates.sort_by(|lhs, rhs| {
        rhs.shared_prefix_len
            .cmp(&lhs.shared_prefix_len)
            .then(rhs.last_verified_at.cmp(&lhs.last_verified_at))
    });
    candidates.truncate(limit);

    Ok(candidates)
}

#[cfg(test)]
mod tests {
    use super::longest_common_prefix;

    #[test]
    fn longest_common_prefix_counts_shared_leading_bytes() {
        assert_eq!(longest_common_prefix(&[1, 2, 3], &[1, 2, 4]), 2);
        assert_eq!(longest_common_prefix(&[1, 2, 3], &[1, 2, 3]), 3);
        assert_eq!(longest_common_prefix(&[1, 2, 3], &[1, 2, 3, 4]), 3);
        assert_eq!(longest_common_prefix(&[9], &[1]), 0);
        assert_eq!(longest_common_prefix(&[], &[1]), 0);
    }
}
