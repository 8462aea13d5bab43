use std::fs;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use datafusion::arrow::array::{
    Date64Builder, Float64Builder, RecordBatch, StringBuilder, TimestampMillisecondBuilder,
    UInt64Builder,
};
use datafusion::arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use datafusion::prelude::{col, ParquetReadOptions, SessionContext};

use crate::config::Config;
use crate::error::Error;
use crate::model::RawMetricRow;

/// Outcome of one upsert: the number of rows the table holds afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadReceipt {
    pub rows_written: usize,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait WarehouseLoader: Send + Sync + 'static {
    /// Merges `rows` into the table identified by `table_key`, deduplicating
    /// on (channel, campaign_name, date) with the latest upload winning.
    /// Applying the same rows twice leaves the table unchanged.
    async fn upsert(&self, rows: &[RawMetricRow], table_key: &str) -> Result<LoadReceipt, Error>;
}

/// One parquet file per table key under a configured directory.
#[derive(Clone)]
pub struct ParquetWarehouse {
    dir: String,
}

impl ParquetWarehouse {
    pub fn new(config: &Config) -> Self {
        ParquetWarehouse {
            dir: config.warehouse_dir.clone(),
        }
    }

    fn table_path(&self, table_key: &str) -> String {
        format!("{}/{}.parquet", self.dir, table_key.replace(' ', "_"))
    }

    fn staging_path(&self, table_key: &str) -> String {
        format!("{}/{}-staging.parquet", self.dir, table_key.replace(' ', "_"))
    }
}

/// The durable table schema. Matches the documented warehouse layout:
/// required columns non-null, day_of_week nullable.
pub fn metrics_schema() -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("channel", DataType::Utf8, false),
        Field::new("campaign_name", DataType::Utf8, false),
        Field::new("date", DataType::Date64, false),
        Field::new("day_of_week", DataType::Utf8, true),
        Field::new("impressions", DataType::UInt64, false),
        Field::new("clicks", DataType::UInt64, false),
        Field::new("spend", DataType::Float64, false),
        Field::new("cpc", DataType::Float64, false),
        Field::new("conversions", DataType::UInt64, false),
        Field::new("cost_per_conversion", DataType::Float64, false),
        Field::new(
            "uploaded_at",
            DataType::Timestamp(TimeUnit::Millisecond, None),
            false,
        ),
    ]))
}

fn date_as_unix_ms(date: NaiveDate) -> i64 {
    (date - DateTime::<Utc>::UNIX_EPOCH.date_naive()).num_milliseconds()
}

/// Builds one RecordBatch from the raw rows, stamping every row with the
/// same upload time.
fn rows_to_batch(rows: &[RawMetricRow], schema: Arc<Schema>) -> Result<RecordBatch, Error> {
    let uploaded_at = Utc::now().timestamp_millis();
    let n = rows.len();

    let mut channel = StringBuilder::new();
    let mut campaign_name = StringBuilder::new();
    let mut date = Date64Builder::with_capacity(n);
    let mut day_of_week = StringBuilder::new();
    let mut impressions = UInt64Builder::with_capacity(n);
    let mut clicks = UInt64Builder::with_capacity(n);
    let mut spend = Float64Builder::with_capacity(n);
    let mut cpc = Float64Builder::with_capacity(n);
    let mut conversions = UInt64Builder::with_capacity(n);
    let mut cost_per_conversion = Float64Builder::with_capacity(n);
    let mut uploaded = TimestampMillisecondBuilder::with_capacity(n);

    for row in rows {
        channel.append_value(&row.channel);
        campaign_name.append_value(&row.campaign_name);
        date.append_value(date_as_unix_ms(row.date));
        day_of_week.append_value(row.day_of_week.to_string());
        impressions.append_value(row.impressions);
        clicks.append_value(row.clicks);
        spend.append_value(row.spend);
        cpc.append_value(row.cpc);
        conversions.append_value(row.conversions);
        cost_per_conversion.append_value(row.cost_per_conversion);
        uploaded.append_value(uploaded_at);
    }

    let batch = RecordBatch::try_new(
        schema,
        vec![
            Arc::new(channel.finish()),
            Arc::new(campaign_name.finish()),
            Arc::new(date.finish()),
            Arc::new(day_of_week.finish()),
            Arc::new(impressions.finish()),
            Arc::new(clicks.finish()),
            Arc::new(spend.finish()),
            Arc::new(cpc.finish()),
            Arc::new(conversions.finish()),
            Arc::new(cost_per_conversion.finish()),
            Arc::new(uploaded.finish()),
        ],
    )?;

    Ok(batch)
}

#[async_trait::async_trait]
impl WarehouseLoader for ParquetWarehouse {
    async fn upsert(&self, rows: &[RawMetricRow], table_key: &str) -> Result<LoadReceipt, Error> {
        if rows.is_empty() {
            return Ok(LoadReceipt { rows_written: 0 });
        }

        fs::create_dir_all(&self.dir)?;

        let ctx = SessionContext::new();
        let schema = metrics_schema();
        let incoming = ctx.read_batch(rows_to_batch(rows, schema.clone())?)?;

        let table_path = self.table_path(table_key);
        let merged = if fs::metadata(&table_path).is_ok() {
            let existing = ctx
                .read_parquet(
                    &table_path,
                    ParquetReadOptions::new().schema(&schema),
                )
                .await?;
            existing.union(incoming)?
        } else {
            incoming
        };

        // DISTINCT ON the upsert key; the newest upload wins. The sort must
        // lead with the key columns.
        let select: Vec<_> = schema
            .fields()
            .iter()
            .map(|field| col(field.name().as_str()))
            .collect();
        let deduped = merged.distinct_on(
            vec![col("channel"), col("campaign_name"), col("date")],
            select,
            Some(vec![
                col("channel").sort(true, false),
                col("campaign_name").sort(true, false),
                col("date").sort(true, false),
                col("uploaded_at").sort(false, true),
            ]),
        )?;

        let batches: Vec<RecordBatch> = deduped.collect().await?;
        let rows_written: usize = batches.iter().map(RecordBatch::num_rows).sum();

        // Stage next to the table and rename so a failed write never
        // clobbers the previous state.
        let staging_path = self.staging_path(table_key);
        let staged = ctx.read_batches(batches)?;
        staged
            .write_parquet(
                &staging_path,
                datafusion::dataframe::DataFrameWriteOptions::default(),
                None,
            )
            .await?;
        fs::rename(&staging_path, &table_path)?;

        Ok(LoadReceipt { rows_written })
    }
}
