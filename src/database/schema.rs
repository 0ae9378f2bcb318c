use anyhow::Result;
use sqlx::PgPool;

/// Idempotent schema application (§6 "Persisted state"). No external
/// migration tool; mirrors `report-tags::database::schema`'s
/// `CREATE TABLE IF NOT EXISTS` / `CREATE OR REPLACE FUNCTION` approach.
pub async fn initialize_schema(pool: &PgPool) -> Result<()> {
    tracing::info!("initializing database schema");

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tenants (
            id UUID PRIMARY KEY,
            name TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            status TEXT NOT NULL DEFAULT 'active',
            workers INT NOT NULL DEFAULT 3,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS messages (
            id UUID NOT NULL,
            tenant_id UUID NOT NULL,
            payload JSONB NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            PRIMARY KEY (tenant_id, id)
        ) PARTITION BY LIST (tenant_id)
        "#,
    )
    .execute(pool)
    .await?;

    // Every tenant needs at least one partition row to route into before
    // its own partition is attached, and list-partitioned tables require a
    // DEFAULT partition to accept rows that don't yet match a bound.
    sqlx::query("CREATE TABLE IF NOT EXISTS messages_default PARTITION OF messages DEFAULT")
        .execute(pool)
        .await?;

    sqlx::query(
        r#"
        CREATE OR REPLACE FUNCTION create_messages_partition(p_tenant_id UUID)
        RETURNS void AS $$
        DECLARE
            partition_name TEXT;
        BEGIN
            partition_name := 'messages_' || replace(p_tenant_id::text, '-', '_');
            EXECUTE format(
                'CREATE TABLE IF NOT EXISTS %I PARTITION OF messages FOR VALUES IN (%L)',
                partition_name,
                p_tenant_id
            );
        END;
        $$ LANGUAGE plpgsql
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE OR REPLACE FUNCTION drop_messages_partition(p_tenant_id UUID)
        RETURNS void AS $$
        DECLARE
            partition_name TEXT;
        BEGIN
            partition_name := 'messages_' || replace(p_tenant_id::text, '-', '_');
            EXECUTE format('DROP TABLE IF EXISTS %I', partition_name);
        END;
        $$ LANGUAGE plpgsql
        "#,
    )
    .execute(pool)
    .await?;

    tracing::info!("database schema initialized");
    Ok(())
}
