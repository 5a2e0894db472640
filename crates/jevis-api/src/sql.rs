//! MySQL-backed data source.

use async_trait::async_trait;
use chrono::{NaiveDateTime, Utc};
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection, MySqlPool, MySqlPoolOptions};
use sqlx::{Connection, FromRow};
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

use crate::error::{JevisError, JevisResult};
use crate::hierarchy;
use crate::model::{
    JevisAttribute, JevisClass, JevisObject, JevisType, ObjectDraft, PrimitiveType, Sample,
    SampleDraft, SampleValue,
};
use crate::source::DataSource;

/// `classrelationship.type` marking a valid parent class.
const VALID_PARENT: i32 = 1;

/// Connection parameters for the JEVis MySQL database.
#[derive(Debug, Clone)]
pub struct SqlConnectOptions {
    pub host: String,
    pub port: u16,
    pub schema: String,
    pub user: String,
    pub password: String,
}

impl SqlConnectOptions {
    fn target(&self) -> String {
        format!("{}:{}/{}", self.host, self.port, self.schema)
    }
}

/// Authenticated JEVis user.
#[derive(Debug, Clone, Copy)]
struct SessionUser {
    id: i64,
    sysadmin: bool,
}

impl SessionUser {
    /// SQL condition restricting `o` to objects this user may see.
    fn visibility(&self) -> &'static str {
        if self.sysadmin {
            "o.deletets IS NULL"
        } else {
            "o.deletets IS NULL AND o.groupid IN (SELECT groupid FROM usergroup WHERE userid = ?)"
        }
    }

    /// Value to bind for the placeholder in [`Self::visibility`], if any.
    fn visibility_bind(&self) -> Option<i64> {
        (!self.sysadmin).then_some(self.id)
    }
}

#[derive(Debug, FromRow)]
struct UserRow {
    id: i64,
    password: String,
    enabled: bool,
    sysadmin: bool,
}

#[derive(Debug, FromRow)]
struct ClassRow {
    name: String,
    description: String,
    isunique: bool,
    inheritance: Option<String>,
}

impl From<ClassRow> for JevisClass {
    fn from(row: ClassRow) -> Self {
        Self {
            name: row.name,
            description: row.description,
            unique: row.isunique,
            inherits: row.inheritance,
        }
    }
}

#[derive(Debug, FromRow)]
struct ObjectRow {
    id: i64,
    name: String,
    class_name: String,
}

impl From<ObjectRow> for JevisObject {
    fn from(row: ObjectRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            class_name: row.class_name,
        }
    }
}

#[derive(Debug, FromRow)]
struct TypeRow {
    name: String,
    primitivetype: i32,
    description: String,
    unit: Option<String>,
}

impl TryFrom<TypeRow> for JevisType {
    type Error = JevisError;

    fn try_from(row: TypeRow) -> Result<Self, Self::Error> {
        Ok(Self {
            name: row.name,
            primitive_type: PrimitiveType::try_from(row.primitivetype)?,
            description: row.description,
            unit: row.unit,
        })
    }
}

#[derive(Debug, FromRow)]
struct AttributeRow {
    object: i64,
    name: String,
    primitivetype: i32,
    unit: Option<String>,
}

impl TryFrom<AttributeRow> for JevisAttribute {
    type Error = JevisError;

    fn try_from(row: AttributeRow) -> Result<Self, Self::Error> {
        Ok(Self {
            object_id: row.object,
            name: row.name,
            primitive_type: PrimitiveType::try_from(row.primitivetype)?,
            unit: row.unit,
        })
    }
}

#[derive(Debug, FromRow)]
struct SampleRow {
    timestamp: NaiveDateTime,
    value: String,
    note: Option<String>,
}

/// Data source talking directly to a JEVis MySQL database.
#[derive(Debug)]
pub struct SqlDataSource {
    pool: MySqlPool,
    user: RwLock<Option<SessionUser>>,
}

impl SqlDataSource {
    /// Open a single connection to the JEVis database.
    pub async fn connect(options: &SqlConnectOptions) -> JevisResult<Self> {
        let connect_options = MySqlConnectOptions::new()
            .host(&options.host)
            .port(options.port)
            .database(&options.schema)
            .username(&options.user)
            .password(&options.password);

        Self::connect_with(connect_options, options.target()).await
    }

    /// Open a connection from prepared sqlx options.
    ///
    /// The first connection is made exactly once; a refused or failed
    /// connect is returned immediately instead of being retried by the pool.
    pub async fn connect_with(options: MySqlConnectOptions, target: String) -> JevisResult<Self> {
        debug!("Connecting to JEVis database at {}", target);

        let connection_error = |e: sqlx::Error| JevisError::Connection {
            target: target.clone(),
            message: e.to_string(),
        };

        let first = MySqlConnection::connect_with(&options)
            .await
            .map_err(connection_error)?;
        first.close().await.map_err(connection_error)?;

        let pool = MySqlPoolOptions::new()
            .max_connections(1)
            .connect_lazy_with(options);

        info!("Connected to JEVis database at {}", target);

        Ok(Self {
            pool,
            user: RwLock::new(None),
        })
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }

    async fn session_user(&self) -> JevisResult<SessionUser> {
        self.user.read().await.ok_or(JevisError::NotAuthenticated)
    }

    async fn all_classes(&self) -> JevisResult<Vec<JevisClass>> {
        let rows = sqlx::query_as::<_, ClassRow>(
            "SELECT name, description, isunique, inheritance FROM objectclass",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(JevisClass::from).collect())
    }

    /// Declared types of `class` and all of its ancestors, nearest class first.
    async fn inherited_types(&self, class_name: &str) -> JevisResult<Vec<JevisType>> {
        let classes = self.all_classes().await?;
        let mut types: Vec<JevisType> = Vec::new();

        for name in hierarchy::with_ancestors(class_name, &classes) {
            for declared in self.types_of(&name).await? {
                if !types.iter().any(|t| t.name == declared.name) {
                    types.push(declared);
                }
            }
        }

        Ok(types)
    }

    async fn types_of(&self, class_name: &str) -> JevisResult<Vec<JevisType>> {
        let rows = sqlx::query_as::<_, TypeRow>(
            r#"
            SELECT name, primitivetype, description, unit
            FROM `type`
            WHERE jevisclass = ?
            ORDER BY displayposition, name
            "#,
        )
        .bind(class_name)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(JevisType::try_from).collect()
    }
}

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

#[async_trait]
impl DataSource for SqlDataSource {
    #[instrument(skip(self, password))]
    async fn authenticate(&self, login: &str, password: &str) -> JevisResult<bool> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, password, enabled, sysadmin FROM jevisuser WHERE login = ?",
        )
        .bind(login)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            debug!("Unknown JEVis user: {}", login);
            return Ok(false);
        };

        if !row.enabled {
            warn!(user = %login, "JEVis user is disabled");
            return Ok(false);
        }

        if !bcrypt::verify(password, &row.password)? {
            return Ok(false);
        }

        *self.user.write().await = Some(SessionUser {
            id: row.id,
            sysadmin: row.sysadmin,
        });
        Ok(true)
    }

    async fn is_alive(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }

    #[instrument(skip(self))]
    async fn object(&self, id: i64) -> JevisResult<Option<JevisObject>> {
        let user = self.session_user().await?;
        let sql = format!(
            "SELECT o.id, o.name, o.`type` AS class_name FROM object o WHERE o.id = ? AND {}",
            user.visibility()
        );

        let mut query = sqlx::query_as::<_, ObjectRow>(&sql).bind(id);
        if let Some(user_id) = user.visibility_bind() {
            query = query.bind(user_id);
        }

        let row = query.fetch_optional(&self.pool).await?;
        Ok(row.map(JevisObject::from))
    }

    #[instrument(skip(self))]
    async fn class(&self, name: &str) -> JevisResult<Option<JevisClass>> {
        self.session_user().await?;
        let row = sqlx::query_as::<_, ClassRow>(
            "SELECT name, description, isunique, inheritance FROM objectclass WHERE name = ?",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(JevisClass::from))
    }

    #[instrument(skip(self, class), fields(class = %class.name))]
    async fn objects_of_class(
        &self,
        class: &JevisClass,
        include_subclasses: bool,
    ) -> JevisResult<Vec<JevisObject>> {
        let user = self.session_user().await?;
        let class_names = if include_subclasses {
            hierarchy::with_subclasses(&class.name, &self.all_classes().await?)
        } else {
            vec![class.name.clone()]
        };

        let sql = format!(
            "SELECT o.id, o.name, o.`type` AS class_name FROM object o WHERE o.`type` IN ({}) AND {} ORDER BY o.id",
            placeholders(class_names.len()),
            user.visibility()
        );

        let mut query = sqlx::query_as::<_, ObjectRow>(&sql);
        for name in &class_names {
            query = query.bind(name);
        }
        if let Some(user_id) = user.visibility_bind() {
            query = query.bind(user_id);
        }

        let rows = query.fetch_all(&self.pool).await?;
        debug!("Found {} objects of {:?}", rows.len(), class_names);
        Ok(rows.into_iter().map(JevisObject::from).collect())
    }

    #[instrument(skip(self, object), fields(object_id = object.id))]
    async fn attribute(
        &self,
        object: &JevisObject,
        name: &str,
    ) -> JevisResult<Option<JevisAttribute>> {
        self.session_user().await?;
        let row = sqlx::query_as::<_, AttributeRow>(
            "SELECT object, name, primitivetype, unit FROM attribute WHERE object = ? AND name = ?",
        )
        .bind(object.id)
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        row.map(JevisAttribute::try_from).transpose()
    }

    #[instrument(skip(self, object), fields(object_id = object.id))]
    async fn attributes(&self, object: &JevisObject) -> JevisResult<Vec<JevisAttribute>> {
        self.session_user().await?;
        let rows = sqlx::query_as::<_, AttributeRow>(
            "SELECT object, name, primitivetype, unit FROM attribute WHERE object = ? ORDER BY name",
        )
        .bind(object.id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(JevisAttribute::try_from).collect()
    }

    #[instrument(skip(self, attribute), fields(attribute = %attribute))]
    async fn latest_sample(&self, attribute: &JevisAttribute) -> JevisResult<Option<Sample>> {
        self.session_user().await?;
        let row = sqlx::query_as::<_, SampleRow>(
            r#"
            SELECT timestamp, value, note
            FROM sample
            WHERE object = ? AND attribute = ?
            ORDER BY timestamp DESC
            LIMIT 1
            "#,
        )
        .bind(attribute.object_id)
        .bind(&attribute.name)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| {
            Ok(Sample {
                timestamp: row.timestamp.and_utc(),
                value: SampleValue::parse(&row.value, attribute.primitive_type, &attribute.name)?,
                note: row.note,
            })
        })
        .transpose()
    }

    #[instrument(skip(self, class), fields(class = %class.name))]
    async fn valid_parents(&self, class: &JevisClass) -> JevisResult<Vec<JevisClass>> {
        self.session_user().await?;
        let rows = sqlx::query_as::<_, ClassRow>(
            r#"
            SELECT c.name, c.description, c.isunique, c.inheritance
            FROM classrelationship r
            JOIN objectclass c ON c.name = r.endclass
            WHERE r.startclass = ? AND r.type = ?
            ORDER BY c.name
            "#,
        )
        .bind(&class.name)
        .bind(VALID_PARENT)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(JevisClass::from).collect())
    }

    #[instrument(skip(self, class), fields(class = %class.name))]
    async fn types(&self, class: &JevisClass) -> JevisResult<Vec<JevisType>> {
        self.session_user().await?;
        self.types_of(&class.name).await
    }

    #[instrument(skip(self, child, parent), fields(child = %child.name, parent_id = parent.id))]
    async fn is_allowed_under(&self, child: &JevisClass, parent: &JevisObject) -> JevisResult<bool> {
        self.session_user().await?;
        let parent_classes = hierarchy::with_ancestors(&parent.class_name, &self.all_classes().await?);
        let allowed = self.valid_parents(child).await?;

        if !allowed
            .iter()
            .any(|valid| parent_classes.contains(&valid.name))
        {
            debug!("{} is not a valid parent class of {}", parent.class_name, child.name);
            return Ok(false);
        }

        if child.unique {
            let existing: (i64,) = sqlx::query_as(
                "SELECT COUNT(*) FROM object WHERE parent = ? AND `type` = ? AND deletets IS NULL",
            )
            .bind(parent.id)
            .bind(&child.name)
            .fetch_one(&self.pool)
            .await?;

            if existing.0 > 0 {
                debug!("Unique class {} already exists under {}", child.name, parent.id);
                return Ok(false);
            }
        }

        Ok(true)
    }

    #[instrument(skip(self, draft), fields(object_id = draft.object_id, attribute = %draft.attribute))]
    async fn commit_sample(&self, draft: &SampleDraft) -> JevisResult<()> {
        self.session_user().await?;
        if !draft.sample.value.fits(draft.primitive_type) {
            warn!(
                "Value {} does not match the {} type of attribute {}",
                draft.sample.value, draft.primitive_type, draft.attribute
            );
        }

        sqlx::query(
            r#"
            INSERT INTO sample (object, attribute, timestamp, value, note, insertts)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(draft.object_id)
        .bind(&draft.attribute)
        .bind(draft.sample.timestamp.naive_utc())
        .bind(draft.sample.value.to_string())
        .bind(&draft.sample.note)
        .bind(Utc::now().naive_utc())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    #[instrument(skip(self, draft), fields(parent_id = draft.parent_id, class = %draft.class_name))]
    async fn commit_object(&self, draft: &ObjectDraft) -> JevisResult<JevisObject> {
        self.session_user().await?;
        let types = self.inherited_types(&draft.class_name).await?;

        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO object (name, `type`, parent, groupid)
            SELECT ?, ?, id, groupid FROM object WHERE id = ? AND deletets IS NULL
            "#,
        )
        .bind(&draft.name)
        .bind(&draft.class_name)
        .bind(draft.parent_id)
        .execute(&mut *tx)
        .await?;

        if inserted.rows_affected() == 0 {
            return Err(JevisError::NotFound(format!(
                "parent object {}",
                draft.parent_id
            )));
        }

        let id = i64::try_from(inserted.last_insert_id()).map_err(|_| {
            JevisError::NotFound(format!("assigned id for object '{}'", draft.name))
        })?;

        for declared in &types {
            sqlx::query(
                "INSERT INTO attribute (object, name, primitivetype, unit) VALUES (?, ?, ?, ?)",
            )
            .bind(id)
            .bind(&declared.name)
            .bind(declared.primitive_type.code())
            .bind(&declared.unit)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!("Created object {} with {} attributes", id, types.len());

        Ok(JevisObject {
            id,
            name: draft.name.clone(),
            class_name: draft.class_name.clone(),
        })
    }
}
