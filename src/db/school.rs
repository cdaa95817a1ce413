use sqlx::PgPool;

/// Provision a per-school PostgreSQL schema with all lifecycle tables.
/// Idempotent: safe to run on every startup.
pub async fn provision_school_schema(pool: &PgPool, slug: &str) -> anyhow::Result<()> {
    let schema = schema_name(slug);

    sqlx::raw_sql(&format!("CREATE SCHEMA IF NOT EXISTS \"{schema}\""))
        .execute(pool)
        .await?;

    // --- QR ownership records ---
    sqlx::raw_sql(&format!(
        r#"CREATE TABLE IF NOT EXISTS "{schema}".qr_codes (
            id          UUID PRIMARY KEY,
            owner_id    UUID NOT NULL,
            payload     TEXT NOT NULL,
            image_ref   TEXT NOT NULL,
            digest      VARCHAR(64) NOT NULL,
            created_at  TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )"#
    ))
    .execute(pool)
    .await?;

    // --- Enrollment requests (staged children embedded as JSONB) ---
    sqlx::raw_sql(&format!(
        r#"CREATE TABLE IF NOT EXISTS "{schema}".enrollment_requests (
            id                UUID PRIMARY KEY,
            guardian_id       UUID NOT NULL,
            school_slug       VARCHAR(63) NOT NULL,
            children          JSONB NOT NULL,
            price_assignments JSONB,
            total_price       NUMERIC(12,2),
            qr_code_id        UUID NOT NULL UNIQUE REFERENCES "{schema}".qr_codes(id),
            status            VARCHAR(16) NOT NULL DEFAULT 'pending'
                              CHECK (status IN ('pending','approved','rejected')),
            child_ids         UUID[] NOT NULL DEFAULT '{{}}',
            submitted_at      TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            resolved_at       TIMESTAMPTZ,
            resolved_by       UUID,
            admin_notes       TEXT
        )"#
    ))
    .execute(pool)
    .await?;

    sqlx::raw_sql(&format!(
        r#"CREATE INDEX IF NOT EXISTS enrollment_requests_status_idx
           ON "{schema}".enrollment_requests (status, submitted_at DESC)"#
    ))
    .execute(pool)
    .await?;

    // --- Children (only ever inserted by enrollment approval) ---
    sqlx::raw_sql(&format!(
        r#"CREATE TABLE IF NOT EXISTS "{schema}".children (
            id                    UUID PRIMARY KEY,
            guardian_id           UUID NOT NULL,
            school_slug           VARCHAR(63) NOT NULL,
            enrollment_request_id UUID NOT NULL REFERENCES "{schema}".enrollment_requests(id),
            profile               JSONB NOT NULL,
            monthly_fee           NUMERIC(12,2) NOT NULL CHECK (monthly_fee >= 0),
            uniform_charged       BOOLEAN NOT NULL DEFAULT FALSE,
            created_at            TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at            TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )"#
    ))
    .execute(pool)
    .await?;

    sqlx::raw_sql(&format!(
        r#"CREATE INDEX IF NOT EXISTS children_guardian_idx
           ON "{schema}".children (guardian_id)"#
    ))
    .execute(pool)
    .await?;

    // --- Payment requests (child references cached as JSONB) ---
    sqlx::raw_sql(&format!(
        r#"CREATE TABLE IF NOT EXISTS "{schema}".payment_requests (
            id            UUID PRIMARY KEY,
            guardian_id   UUID NOT NULL,
            school_slug   VARCHAR(63) NOT NULL,
            children      JSONB NOT NULL,
            window_start  DATE NOT NULL,
            window_end    DATE NOT NULL,
            qr_code_id    UUID NOT NULL UNIQUE REFERENCES "{schema}".qr_codes(id),
            status        VARCHAR(16) NOT NULL DEFAULT 'pending'
                          CHECK (status IN ('pending','settled','cancelled')),
            total_amount  NUMERIC(12,2) NOT NULL,
            submitted_at  TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            resolved_at   TIMESTAMPTZ,
            resolved_by   UUID,
            notes         TEXT
        )"#
    ))
    .execute(pool)
    .await?;

    // --- Payments ledger (append-only) ---
    sqlx::raw_sql(&format!(
        r#"CREATE TABLE IF NOT EXISTS "{schema}".payments (
            id                 UUID PRIMARY KEY,
            guardian_id        UUID NOT NULL,
            school_slug        VARCHAR(63) NOT NULL,
            child_id           UUID NOT NULL REFERENCES "{schema}".children(id),
            amount             NUMERIC(12,2) NOT NULL CHECK (amount > 0),
            concept            VARCHAR(16) NOT NULL
                               CHECK (concept IN ('monthly','enrollment','uniform','other')),
            period_month       INTEGER NOT NULL CHECK (period_month BETWEEN 1 AND 12),
            period_year        INTEGER NOT NULL,
            paid_at            TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            payment_request_id UUID REFERENCES "{schema}".payment_requests(id),
            processed_by       UUID NOT NULL
        )"#
    ))
    .execute(pool)
    .await?;

    sqlx::raw_sql(&format!(
        r#"CREATE INDEX IF NOT EXISTS payments_child_period_idx
           ON "{schema}".payments (child_id, period_year, period_month)"#
    ))
    .execute(pool)
    .await?;

    // --- Guardian notifications ---
    sqlx::raw_sql(&format!(
        r#"CREATE TABLE IF NOT EXISTS "{schema}".notifications (
            id           UUID PRIMARY KEY DEFAULT public.uuid_generate_v4(),
            guardian_id  UUID NOT NULL,
            message      TEXT NOT NULL,
            link_hint    TEXT,
            is_read      BOOLEAN NOT NULL DEFAULT FALSE,
            created_at   TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )"#
    ))
    .execute(pool)
    .await?;

    // --- Push tokens ---
    sqlx::raw_sql(&format!(
        r#"CREATE TABLE IF NOT EXISTS "{schema}".push_tokens (
            id          UUID PRIMARY KEY DEFAULT public.uuid_generate_v4(),
            user_id     UUID NOT NULL,
            platform    VARCHAR(16) NOT NULL,
            token       TEXT NOT NULL,
            created_at  TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            UNIQUE (user_id, token)
        )"#
    ))
    .execute(pool)
    .await?;

    // --- updated_at trigger for children ---
    sqlx::raw_sql(&format!(
        r#"CREATE OR REPLACE FUNCTION "{schema}".update_updated_at()
           RETURNS TRIGGER AS $fn$
           BEGIN NEW.updated_at = NOW(); RETURN NEW; END;
           $fn$ LANGUAGE plpgsql"#
    ))
    .execute(pool)
    .await?;

    sqlx::raw_sql(&format!(
        r#"DROP TRIGGER IF EXISTS "children_updated_at" ON "{schema}"."children";
           CREATE TRIGGER "children_updated_at"
           BEFORE UPDATE ON "{schema}"."children"
           FOR EACH ROW EXECUTE FUNCTION "{schema}".update_updated_at()"#
    ))
    .execute(pool)
    .await?;

    tracing::info!("Provisioned school schema: {schema}");
    Ok(())
}

/// Returns the PostgreSQL schema name for a given school slug.
pub fn schema_name(slug: &str) -> String {
    format!("escuela_{}", slug.to_lowercase().replace('-', "_"))
}
