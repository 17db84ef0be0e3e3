use crate::database::DbPool;
use crate::models::file::File;
use crate::models::team::{Team, TeamFileShare, TeamMember, TeamRole};
use crate::services::file_storage::get_owned_file;
use crate::utils::error::{AppError, AppResult};
use crate::utils::validation::validate_team_name;
use chrono::Utc;

pub async fn create_team(pool: &DbPool, owner_id: &str, name: String) -> AppResult<Team> {
    validate_team_name(&name)?;

    let team = Team::new(name, owner_id.to_string());

    sqlx::query("INSERT INTO teams (id, name, owner_id, created_at) VALUES (?, ?, ?, ?)")
        .bind(&team.id)
        .bind(&team.name)
        .bind(&team.owner_id)
        .bind(&team.created_at)
        .execute(pool.as_ref())
        .await?;

    sqlx::query(
        "INSERT INTO team_members (team_id, user_id, role, joined_at) VALUES (?, ?, ?, ?)",
    )
    .bind(&team.id)
    .bind(owner_id)
    .bind(TeamRole::Admin.as_str())
    .bind(Utc::now().to_rfc3339())
    .execute(pool.as_ref())
    .await?;

    tracing::info!("Team created: id={}, name={}", team.id, team.name);

    Ok(team)
}

pub async fn get_membership(
    pool: &DbPool,
    team_id: &str,
    user_id: &str,
) -> AppResult<TeamMember> {
    sqlx::query_as::<_, TeamMember>(
        "SELECT * FROM team_members WHERE team_id = ? AND user_id = ?",
    )
    .bind(team_id)
    .bind(user_id)
    .fetch_optional(pool.as_ref())
    .await?
    .ok_or_else(|| AppError::NotFound("Team not found".to_string()))
}

async fn require_admin(pool: &DbPool, team_id: &str, user_id: &str) -> AppResult<()> {
    let membership = get_membership(pool, team_id, user_id).await?;

    if TeamRole::parse(&membership.role) != Some(TeamRole::Admin) {
        return Err(AppError::Forbidden(
            "Only team admins can do that".to_string(),
        ));
    }

    Ok(())
}

pub async fn list_user_teams(pool: &DbPool, user_id: &str) -> AppResult<Vec<Team>> {
    let teams = sqlx::query_as::<_, Team>(
        "SELECT t.* FROM teams t
         JOIN team_members m ON m.team_id = t.id
         WHERE m.user_id = ?
         ORDER BY t.created_at",
    )
    .bind(user_id)
    .fetch_all(pool.as_ref())
    .await?;

    Ok(teams)
}

pub async fn add_member(
    pool: &DbPool,
    team_id: &str,
    acting_user: &str,
    new_member: &str,
) -> AppResult<()> {
    require_admin(pool, team_id, acting_user).await?;

    let user_exists: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE id = ?")
        .bind(new_member)
        .fetch_one(pool.as_ref())
        .await?;

    if user_exists == 0 {
        return Err(AppError::NotFound("User not found".to_string()));
    }

    let already: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM team_members WHERE team_id = ? AND user_id = ?")
            .bind(team_id)
            .bind(new_member)
            .fetch_one(pool.as_ref())
            .await?;

    if already > 0 {
        return Err(AppError::BadRequest("Already a team member".to_string()));
    }

    sqlx::query(
        "INSERT INTO team_members (team_id, user_id, role, joined_at) VALUES (?, ?, ?, ?)",
    )
    .bind(team_id)
    .bind(new_member)
    .bind(TeamRole::Member.as_str())
    .bind(Utc::now().to_rfc3339())
    .execute(pool.as_ref())
    .await?;

    Ok(())
}

pub async fn remove_member(
    pool: &DbPool,
    team_id: &str,
    acting_user: &str,
    member: &str,
) -> AppResult<()> {
    require_admin(pool, team_id, acting_user).await?;

    let team = sqlx::query_as::<_, Team>("SELECT * FROM teams WHERE id = ?")
        .bind(team_id)
        .fetch_optional(pool.as_ref())
        .await?
        .ok_or_else(|| AppError::NotFound("Team not found".to_string()))?;

    if member == team.owner_id {
        return Err(AppError::BadRequest(
            "The team owner cannot be removed".to_string(),
        ));
    }

    sqlx::query("DELETE FROM team_members WHERE team_id = ? AND user_id = ?")
        .bind(team_id)
        .bind(member)
        .execute(pool.as_ref())
        .await?;

    Ok(())
}

/// Sharing requires membership and file ownership; the share row references
/// the file, it does not copy it.
pub async fn share_file_to_team(
    pool: &DbPool,
    team_id: &str,
    user_id: &str,
    file_id: &str,
) -> AppResult<TeamFileShare> {
    get_membership(pool, team_id, user_id).await?;
    get_owned_file(pool, file_id, user_id).await?;

    let already: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM team_file_shares WHERE team_id = ? AND file_id = ?",
    )
    .bind(team_id)
    .bind(file_id)
    .fetch_one(pool.as_ref())
    .await?;

    if already > 0 {
        return Err(AppError::BadRequest(
            "File is already shared with this team".to_string(),
        ));
    }

    let share = TeamFileShare::new(
        team_id.to_string(),
        file_id.to_string(),
        user_id.to_string(),
    );

    sqlx::query(
        "INSERT INTO team_file_shares (id, team_id, file_id, shared_by, shared_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&share.id)
    .bind(&share.team_id)
    .bind(&share.file_id)
    .bind(&share.shared_by)
    .bind(&share.shared_at)
    .execute(pool.as_ref())
    .await?;

    tracing::info!(
        "File shared to team: file={}, team={}, by={}",
        file_id,
        team_id,
        user_id
    );

    Ok(share)
}

pub async fn list_team_files(pool: &DbPool, team_id: &str, user_id: &str) -> AppResult<Vec<File>> {
    get_membership(pool, team_id, user_id).await?;

    let files = sqlx::query_as::<_, File>(
        "SELECT f.* FROM files f
         JOIN team_file_shares s ON s.file_id = f.id
         WHERE s.team_id = ? AND f.is_deleted = 0
         ORDER BY s.shared_at DESC",
    )
    .bind(team_id)
    .fetch_all(pool.as_ref())
    .await?;

    Ok(files)
}

/// Admins unshare; the underlying file is untouched.
pub async fn remove_team_share(
    pool: &DbPool,
    team_id: &str,
    acting_user: &str,
    share_id: &str,
) -> AppResult<()> {
    require_admin(pool, team_id, acting_user).await?;

    let result = sqlx::query("DELETE FROM team_file_shares WHERE id = ? AND team_id = ?")
        .bind(share_id)
        .bind(team_id)
        .execute(pool.as_ref())
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Team share not found".to_string()));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::test_pool;
    use crate::models::file::File;

    async fn seed_user(pool: &DbPool, user_id: &str) {
        sqlx::query(
            "INSERT INTO users (id, username, password_hash, created_at) VALUES (?, ?, 'x', '2026-01-01T00:00:00+00:00')",
        )
        .bind(user_id)
        .bind(format!("user-{}", user_id))
        .execute(pool.as_ref())
        .await
        .unwrap();
    }

    async fn seed_file(pool: &DbPool, owner_id: &str) -> File {
        let file = File::new(
            owner_id.to_string(),
            "deck.pdf".to_string(),
            "deck.bin".to_string(),
            "application/pdf".to_string(),
            128,
            "hash".to_string(),
            None,
        );

        sqlx::query(
            "INSERT INTO files (id, owner_id, original_name, file_name, content_type, size, file_hash, uploaded_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&file.id)
        .bind(&file.owner_id)
        .bind(&file.original_name)
        .bind(&file.file_name)
        .bind(&file.content_type)
        .bind(file.size)
        .bind(&file.file_hash)
        .bind(&file.uploaded_at)
        .execute(pool.as_ref())
        .await
        .unwrap();

        file
    }

    #[tokio::test]
    async fn test_share_and_unshare_keeps_file() {
        let pool = test_pool().await;
        seed_user(&pool, "owner").await;
        seed_user(&pool, "member").await;
        let file = seed_file(&pool, "owner").await;

        let team = create_team(&pool, "owner", "design".to_string()).await.unwrap();
        add_member(&pool, &team.id, "owner", "member").await.unwrap();

        let share = share_file_to_team(&pool, &team.id, "owner", &file.id)
            .await
            .unwrap();

        let listed = list_team_files(&pool, &team.id, "member").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, file.id);

        remove_team_share(&pool, &team.id, "owner", &share.id)
            .await
            .unwrap();

        assert!(list_team_files(&pool, &team.id, "member").await.unwrap().is_empty());

        // File row survives the unshare.
        let still_there: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM files WHERE id = ? AND is_deleted = 0")
                .bind(&file.id)
                .fetch_one(pool.as_ref())
                .await
                .unwrap();
        assert_eq!(still_there, 1);
    }

    #[tokio::test]
    async fn test_member_cannot_unshare() {
        let pool = test_pool().await;
        seed_user(&pool, "owner").await;
        seed_user(&pool, "member").await;
        let file = seed_file(&pool, "owner").await;

        let team = create_team(&pool, "owner", "design".to_string()).await.unwrap();
        add_member(&pool, &team.id, "owner", "member").await.unwrap();
        let share = share_file_to_team(&pool, &team.id, "owner", &file.id)
            .await
            .unwrap();

        let result = remove_team_share(&pool, &team.id, "member", &share.id).await;
        assert!(matches!(result, Err(AppError::Forbidden(_))));
    }

    #[tokio::test]
    async fn test_outsider_cannot_list() {
        let pool = test_pool().await;
        seed_user(&pool, "owner").await;
        seed_user(&pool, "stranger").await;

        let team = create_team(&pool, "owner", "design".to_string()).await.unwrap();

        let result = list_team_files(&pool, &team.id, "stranger").await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }
}
