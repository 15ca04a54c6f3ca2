// ==========================================
// 小批量生产排产系统 - 配方数据仓储
// ==========================================
// 红线: Repository 不含业务逻辑
// ==========================================

use crate::domain::recipe::{Recipe, RecipeComponent, RecipeIngredient};
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::row_utils::{format_ts, parse_ts};
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use std::sync::{Arc, Mutex};

const RECIPE_COLUMNS: &str =
    "recipe_id, name, category, yield_quantity, yield_unit, notes, created_at, updated_at";

// ==========================================
// RecipeRepository - 配方仓储
// ==========================================
pub struct RecipeRepository {
    conn: Arc<Mutex<Connection>>,
}

impl RecipeRepository {
    /// 创建新的RecipeRepository实例
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 获取数据库连接
    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    // ==========================================
    // 独立调用（自持连接）
    // ==========================================

    /// 创建配方
    pub fn insert(&self, recipe: &Recipe) -> RepositoryResult<String> {
        let conn = self.get_conn()?;
        let tx = conn.unchecked_transaction()?;
        Self::insert_tx(&tx, recipe)?;
        tx.commit()?;
        Ok(recipe.recipe_id.clone())
    }

    /// 更新配方基础信息（含 updated_at）
    pub fn update(&self, recipe: &Recipe) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let rows = conn.execute(
            r#"UPDATE recipe
               SET name = ?, category = ?, yield_quantity = ?, yield_unit = ?,
                   notes = ?, updated_at = ?
               WHERE recipe_id = ?"#,
            params![
                &recipe.name,
                &recipe.category,
                recipe.yield_quantity,
                &recipe.yield_unit,
                &recipe.notes,
                format_ts(&recipe.updated_at),
                &recipe.recipe_id,
            ],
        )?;
        if rows == 0 {
            return Err(RepositoryError::NotFound {
                entity: "Recipe".to_string(),
                id: recipe.recipe_id.clone(),
            });
        }
        Ok(())
    }

    /// 删除配方（被成品单元引用时由外键 RESTRICT 拒绝）
    pub fn delete(&self, recipe_id: &str) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute("DELETE FROM recipe WHERE recipe_id = ?", params![recipe_id])?;
        Ok(())
    }

    /// 按recipe_id查询配方
    pub fn find_by_id(&self, recipe_id: &str) -> RepositoryResult<Option<Recipe>> {
        let conn = self.get_conn()?;
        Self::find_by_id_in(&conn, recipe_id)
    }

    /// 添加配方原料
    pub fn add_ingredient(&self, ingredient: &RecipeIngredient) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        Self::add_ingredient_on(&conn, ingredient)
    }

    /// 移除配方原料
    pub fn remove_ingredient(&self, recipe_id: &str, item_id: &str) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            "DELETE FROM recipe_ingredient WHERE recipe_id = ? AND item_id = ?",
            params![recipe_id, item_id],
        )?;
        Ok(())
    }

    /// 添加嵌套配方
    pub fn add_component(&self, component: &RecipeComponent) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        Self::add_component_on(&conn, component)
    }

    /// 查询配方原料
    pub fn list_ingredients(&self, recipe_id: &str) -> RepositoryResult<Vec<RecipeIngredient>> {
        let conn = self.get_conn()?;
        Self::list_ingredients_in(&conn, recipe_id)
    }

    // ==========================================
    // 事务内调用
    // ==========================================

    /// 在事务中创建配方
    pub fn insert_tx(tx: &Transaction, recipe: &Recipe) -> RepositoryResult<()> {
        tx.execute(
            r#"INSERT INTO recipe (
                recipe_id, name, category, yield_quantity, yield_unit,
                notes, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#,
            params![
                &recipe.recipe_id,
                &recipe.name,
                &recipe.category,
                recipe.yield_quantity,
                &recipe.yield_unit,
                &recipe.notes,
                format_ts(&recipe.created_at),
                format_ts(&recipe.updated_at),
            ],
        )?;
        Ok(())
    }

    pub fn add_ingredient_on(conn: &Connection, ingredient: &RecipeIngredient) -> RepositoryResult<()> {
        conn.execute(
            r#"INSERT INTO recipe_ingredient (recipe_id, item_id, quantity, unit)
               VALUES (?, ?, ?, ?)"#,
            params![
                &ingredient.recipe_id,
                &ingredient.item_id,
                ingredient.quantity,
                &ingredient.unit,
            ],
        )?;
        Ok(())
    }

    pub fn add_component_on(conn: &Connection, component: &RecipeComponent) -> RepositoryResult<()> {
        conn.execute(
            r#"INSERT INTO recipe_component (recipe_id, component_recipe_id, batch_multiplier)
               VALUES (?, ?, ?)"#,
            params![
                &component.recipe_id,
                &component.component_recipe_id,
                component.batch_multiplier,
            ],
        )?;
        Ok(())
    }

    pub fn find_by_id_in(conn: &Connection, recipe_id: &str) -> RepositoryResult<Option<Recipe>> {
        let sql = format!("SELECT {} FROM recipe WHERE recipe_id = ?", RECIPE_COLUMNS);
        let recipe = conn
            .query_row(&sql, params![recipe_id], Self::map_row)
            .optional()?;
        Ok(recipe)
    }

    /// 查询配方原料（按 item_id 排序，保证输出稳定）
    pub fn list_ingredients_in(conn: &Connection, recipe_id: &str) -> RepositoryResult<Vec<RecipeIngredient>> {
        let mut stmt = conn.prepare(
            r#"SELECT recipe_id, item_id, quantity, unit
               FROM recipe_ingredient
               WHERE recipe_id = ?
               ORDER BY item_id"#,
        )?;
        let rows = stmt
            .query_map(params![recipe_id], |row| {
                Ok(RecipeIngredient {
                    recipe_id: row.get(0)?,
                    item_id: row.get(1)?,
                    quantity: row.get(2)?,
                    unit: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn list_components_in(conn: &Connection, recipe_id: &str) -> RepositoryResult<Vec<RecipeComponent>> {
        let mut stmt = conn.prepare(
            r#"SELECT recipe_id, component_recipe_id, batch_multiplier
               FROM recipe_component
               WHERE recipe_id = ?
               ORDER BY component_recipe_id"#,
        )?;
        let rows = stmt
            .query_map(params![recipe_id], |row| {
                Ok(RecipeComponent {
                    recipe_id: row.get(0)?,
                    component_recipe_id: row.get(1)?,
                    batch_multiplier: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// 映射数据库行到Recipe对象
    fn map_row(row: &rusqlite::Row) -> rusqlite::Result<Recipe> {
        Ok(Recipe {
            recipe_id: row.get(0)?,
            name: row.get(1)?,
            category: row.get(2)?,
            yield_quantity: row.get(3)?,
            yield_unit: row.get(4)?,
            notes: row.get(5)?,
            created_at: parse_ts(row, 6)?,
            updated_at: parse_ts(row, 7)?,
        })
    }
}
