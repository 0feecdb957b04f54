//! 数据库查询操作

use crate::connection::DatabasePool;
use crate::models::*;
use mirs_core::{
    AuditEntry, Device, Examination, ExaminationDetails, ExaminationReport, MedicalImage,
    MedicalImageSummary, MirsError, Patient, Result,
};
use sqlx::Row;
use uuid::Uuid;

/// 数据库查询操作接口
pub struct DatabaseQueries<'a> {
    pool: &'a DatabasePool,
}

impl<'a> DatabaseQueries<'a> {
    pub fn new(pool: &'a DatabasePool) -> Self {
        Self { pool }
    }

    /// 创建数据库表
    pub async fn create_tables(&self) -> Result<()> {
        let pool = self.pool.pool();

        // 创建用户表
        sqlx::query(r#"
            CREATE TABLE IF NOT EXISTS users (
                id UUID PRIMARY KEY,
                username VARCHAR(64) UNIQUE NOT NULL,
                email VARCHAR(255) NOT NULL,
                full_name VARCHAR(255) NOT NULL,
                role VARCHAR(20) NOT NULL,
                hashed_password TEXT NOT NULL,
                is_active BOOLEAN NOT NULL DEFAULT TRUE,
                created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW(),
                last_login TIMESTAMP WITH TIME ZONE
            )
        "#).execute(pool).await.map_err(|e| MirsError::Database(e.to_string()))?;

        // 创建患者表（列表字段以JSON文本存储）
        sqlx::query(r#"
            CREATE TABLE IF NOT EXISTS patients (
                id UUID PRIMARY KEY,
                patient_id VARCHAR(64) UNIQUE NOT NULL,
                first_name VARCHAR(255) NOT NULL,
                last_name VARCHAR(255) NOT NULL,
                date_of_birth VARCHAR(32) NOT NULL,
                gender VARCHAR(16) NOT NULL,
                phone VARCHAR(32) NOT NULL,
                email VARCHAR(255),
                address TEXT NOT NULL,
                medical_record_number VARCHAR(64) NOT NULL,
                primary_physician VARCHAR(255) NOT NULL,
                allergies TEXT NOT NULL DEFAULT '[]',
                medications TEXT NOT NULL DEFAULT '[]',
                medical_history TEXT NOT NULL DEFAULT '[]',
                insurance_provider VARCHAR(255) NOT NULL,
                insurance_policy_number VARCHAR(64) NOT NULL,
                insurance_group_number VARCHAR(64),
                consent_given BOOLEAN NOT NULL DEFAULT FALSE,
                created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW(),
                created_by UUID NOT NULL,
                last_accessed TIMESTAMP WITH TIME ZONE
            )
        "#).execute(pool).await.map_err(|e| MirsError::Database(e.to_string()))?;

        // 创建影像表。base64列是文件存储的回退来源
        sqlx::query(r#"
            CREATE TABLE IF NOT EXISTS medical_images (
                id UUID PRIMARY KEY,
                patient_id UUID NOT NULL REFERENCES patients(id) ON DELETE CASCADE,
                study_id VARCHAR(128) NOT NULL,
                series_id VARCHAR(128) NOT NULL,
                instance_id VARCHAR(128) NOT NULL,
                modality VARCHAR(16) NOT NULL,
                body_part VARCHAR(64) NOT NULL,
                study_date VARCHAR(32) NOT NULL,
                study_time VARCHAR(32) NOT NULL,
                institution_name VARCHAR(255) NOT NULL,
                referring_physician VARCHAR(255) NOT NULL,
                dicom_metadata TEXT NOT NULL DEFAULT '{}',
                original_filename VARCHAR(255) NOT NULL,
                file_size BIGINT NOT NULL,
                file_sha256 CHAR(64) NOT NULL,
                image_format VARCHAR(16) NOT NULL,
                window_center DOUBLE PRECISION,
                window_width DOUBLE PRECISION,
                image_data_b64 TEXT,
                thumbnail_data_b64 TEXT,
                uploaded_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW(),
                uploaded_by UUID NOT NULL
            )
        "#).execute(pool).await.map_err(|e| MirsError::Database(e.to_string()))?;

        // 创建设备表
        sqlx::query(r#"
            CREATE TABLE IF NOT EXISTS devices (
                id UUID PRIMARY KEY,
                name VARCHAR(255) NOT NULL,
                model VARCHAR(255) NOT NULL,
                manufacturer VARCHAR(255) NOT NULL,
                device_type VARCHAR(64) NOT NULL,
                serial_number VARCHAR(128),
                installation_date VARCHAR(32),
                last_calibration VARCHAR(32),
                status VARCHAR(20) NOT NULL DEFAULT 'active',
                location VARCHAR(255) NOT NULL,
                specifications TEXT NOT NULL DEFAULT '{}',
                created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW()
            )
        "#).execute(pool).await.map_err(|e| MirsError::Database(e.to_string()))?;

        // 创建检查表
        sqlx::query(r#"
            CREATE TABLE IF NOT EXISTS examinations (
                id UUID PRIMARY KEY,
                patient_id UUID NOT NULL REFERENCES patients(id) ON DELETE CASCADE,
                examination_type VARCHAR(64) NOT NULL,
                examination_date VARCHAR(32) NOT NULL,
                examination_time VARCHAR(32) NOT NULL,
                device_id UUID NOT NULL REFERENCES devices(id),
                device_name VARCHAR(255) NOT NULL,
                referring_physician VARCHAR(255) NOT NULL,
                performing_physician VARCHAR(255) NOT NULL,
                body_part_examined VARCHAR(64) NOT NULL,
                clinical_indication TEXT NOT NULL,
                examination_protocol TEXT NOT NULL,
                contrast_agent VARCHAR(128),
                contrast_amount VARCHAR(64),
                patient_position VARCHAR(64),
                radiation_dose VARCHAR(64),
                image_count INTEGER NOT NULL DEFAULT 0,
                status VARCHAR(20) NOT NULL DEFAULT 'pending',
                priority VARCHAR(20) NOT NULL DEFAULT 'normal',
                created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW(),
                created_by UUID NOT NULL
            )
        "#).execute(pool).await.map_err(|e| MirsError::Database(e.to_string()))?;

        // 创建报告表
        sqlx::query(r#"
            CREATE TABLE IF NOT EXISTS examination_reports (
                id UUID PRIMARY KEY,
                examination_id UUID NOT NULL REFERENCES examinations(id) ON DELETE CASCADE,
                report_type VARCHAR(20) NOT NULL DEFAULT 'final',
                report_status VARCHAR(20) NOT NULL DEFAULT 'draft',
                findings TEXT NOT NULL,
                impression TEXT NOT NULL,
                recommendations TEXT NOT NULL,
                report_date VARCHAR(32) NOT NULL,
                report_time VARCHAR(32) NOT NULL,
                reporting_physician VARCHAR(255) NOT NULL,
                dictated_by VARCHAR(255),
                transcribed_by VARCHAR(255),
                technical_quality VARCHAR(20) NOT NULL DEFAULT 'adequate',
                limitations TEXT,
                comparison_studies TEXT,
                created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW(),
                created_by UUID NOT NULL
            )
        "#).execute(pool).await.map_err(|e| MirsError::Database(e.to_string()))?;

        // 创建审计日志表
        sqlx::query(r#"
            CREATE TABLE IF NOT EXISTS audit_logs (
                id UUID PRIMARY KEY,
                action VARCHAR(64) NOT NULL,
                resource_type VARCHAR(32) NOT NULL,
                resource_id VARCHAR(128) NOT NULL,
                user_id UUID NOT NULL,
                username VARCHAR(64) NOT NULL,
                created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW()
            )
        "#).execute(pool).await.map_err(|e| MirsError::Database(e.to_string()))?;

        // 创建索引以优化查询性能
        self.create_indexes().await?;

        tracing::info!("数据库表创建完成");
        Ok(())
    }

    /// 创建数据库索引
    async fn create_indexes(&self) -> Result<()> {
        let pool = self.pool.pool();

        let indexes = vec![
            "CREATE INDEX IF NOT EXISTS idx_users_username ON users(username)",
            "CREATE INDEX IF NOT EXISTS idx_patients_patient_id ON patients(patient_id)",
            "CREATE INDEX IF NOT EXISTS idx_patients_last_name ON patients(last_name)",
            "CREATE INDEX IF NOT EXISTS idx_images_patient_id ON medical_images(patient_id)",
            "CREATE INDEX IF NOT EXISTS idx_images_study_id ON medical_images(study_id)",
            "CREATE INDEX IF NOT EXISTS idx_examinations_patient_id ON examinations(patient_id)",
            "CREATE INDEX IF NOT EXISTS idx_examinations_device_id ON examinations(device_id)",
            "CREATE INDEX IF NOT EXISTS idx_reports_examination_id ON examination_reports(examination_id)",
            "CREATE INDEX IF NOT EXISTS idx_audit_logs_created_at ON audit_logs(created_at)",
        ];

        for index_sql in indexes {
            sqlx::query(index_sql)
                .execute(pool)
                .await
                .map_err(|e| MirsError::Database(e.to_string()))?;
        }

        tracing::info!("数据库索引创建完成");
        Ok(())
    }

    // ========== 用户相关操作 ==========

    /// 创建新用户
    pub async fn create_user(&self, user: &NewUser) -> Result<Uuid> {
        let pool = self.pool.pool();

        sqlx::query(r#"
            INSERT INTO users (id, username, email, full_name, role, hashed_password)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id
        "#)
        .bind(user.id)
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.full_name)
        .bind(user.role.as_str())
        .bind(&user.hashed_password)
        .fetch_one(pool)
        .await
        .map(|row| row.get("id"))
        .map_err(|e| MirsError::Database(e.to_string()))
    }

    /// 根据用户名查找用户（含密码哈希，用于登录验证）
    pub async fn get_user_by_username(&self, username: &str) -> Result<Option<DbUser>> {
        let pool = self.pool.pool();

        sqlx::query_as::<_, DbUser>("SELECT * FROM users WHERE username = $1")
            .bind(username)
            .fetch_optional(pool)
            .await
            .map_err(|e| MirsError::Database(e.to_string()))
    }

    /// 根据ID查找用户
    pub async fn get_user_by_id(&self, id: &Uuid) -> Result<Option<DbUser>> {
        let pool = self.pool.pool();

        sqlx::query_as::<_, DbUser>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
            .map_err(|e| MirsError::Database(e.to_string()))
    }

    /// 更新用户最后登录时间
    pub async fn update_last_login(&self, id: &Uuid) -> Result<()> {
        let pool = self.pool.pool();

        sqlx::query("UPDATE users SET last_login = NOW() WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await
            .map_err(|e| MirsError::Database(e.to_string()))?;

        Ok(())
    }

    /// 注册用户总数，健康检查用它探测数据库可用性
    pub async fn count_users(&self) -> Result<i64> {
        let pool = self.pool.pool();

        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users")
            .fetch_one(pool)
            .await
            .map_err(|e| MirsError::Database(e.to_string()))
    }

    // ========== 患者相关操作 ==========

    /// 创建新患者
    pub async fn create_patient(&self, patient: &Patient) -> Result<Uuid> {
        let pool = self.pool.pool();

        sqlx::query(r#"
            INSERT INTO patients (
                id, patient_id, first_name, last_name, date_of_birth, gender, phone, email,
                address, medical_record_number, primary_physician, allergies, medications,
                medical_history, insurance_provider, insurance_policy_number,
                insurance_group_number, consent_given, created_at, updated_at, created_by
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16,
                    $17, $18, $19, $20, $21)
            RETURNING id
        "#)
        .bind(patient.id)
        .bind(&patient.patient_id)
        .bind(&patient.first_name)
        .bind(&patient.last_name)
        .bind(&patient.date_of_birth)
        .bind(&patient.gender)
        .bind(&patient.phone)
        .bind(&patient.email)
        .bind(&patient.address)
        .bind(&patient.medical_record_number)
        .bind(&patient.primary_physician)
        .bind(serde_json::to_string(&patient.allergies)?)
        .bind(serde_json::to_string(&patient.medications)?)
        .bind(serde_json::to_string(&patient.medical_history)?)
        .bind(&patient.insurance_provider)
        .bind(&patient.insurance_policy_number)
        .bind(&patient.insurance_group_number)
        .bind(patient.consent_given)
        .bind(patient.created_at)
        .bind(patient.updated_at)
        .bind(patient.created_by)
        .fetch_one(pool)
        .await
        .map(|row| row.get("id"))
        .map_err(|e| MirsError::Database(e.to_string()))
    }

    /// 获取所有患者（按创建时间倒序）
    pub async fn list_patients(&self) -> Result<Vec<Patient>> {
        let pool = self.pool.pool();

        let results = sqlx::query_as::<_, DbPatient>(
            "SELECT * FROM patients ORDER BY created_at DESC",
        )
        .fetch_all(pool)
        .await
        .map_err(|e| MirsError::Database(e.to_string()))?;

        Ok(results.into_iter().map(Patient::from).collect())
    }

    /// 根据ID查找患者
    pub async fn get_patient(&self, id: &Uuid) -> Result<Option<Patient>> {
        let pool = self.pool.pool();

        let result = sqlx::query_as::<_, DbPatient>("SELECT * FROM patients WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
            .map_err(|e| MirsError::Database(e.to_string()))?;

        Ok(result.map(Patient::from))
    }

    /// 根据院内患者编号查找患者（用于唯一性检查）
    pub async fn get_patient_by_patient_id(&self, patient_id: &str) -> Result<Option<Patient>> {
        let pool = self.pool.pool();

        let result =
            sqlx::query_as::<_, DbPatient>("SELECT * FROM patients WHERE patient_id = $1")
                .bind(patient_id)
                .fetch_optional(pool)
                .await
                .map_err(|e| MirsError::Database(e.to_string()))?;

        Ok(result.map(Patient::from))
    }

    /// 更新患者档案
    pub async fn update_patient(&self, patient: &Patient) -> Result<()> {
        let pool = self.pool.pool();

        sqlx::query(r#"
            UPDATE patients SET
                patient_id = $2, first_name = $3, last_name = $4, date_of_birth = $5,
                gender = $6, phone = $7, email = $8, address = $9,
                medical_record_number = $10, primary_physician = $11, allergies = $12,
                medications = $13, medical_history = $14, insurance_provider = $15,
                insurance_policy_number = $16, insurance_group_number = $17,
                consent_given = $18, updated_at = $19
            WHERE id = $1
        "#)
        .bind(patient.id)
        .bind(&patient.patient_id)
        .bind(&patient.first_name)
        .bind(&patient.last_name)
        .bind(&patient.date_of_birth)
        .bind(&patient.gender)
        .bind(&patient.phone)
        .bind(&patient.email)
        .bind(&patient.address)
        .bind(&patient.medical_record_number)
        .bind(&patient.primary_physician)
        .bind(serde_json::to_string(&patient.allergies)?)
        .bind(serde_json::to_string(&patient.medications)?)
        .bind(serde_json::to_string(&patient.medical_history)?)
        .bind(&patient.insurance_provider)
        .bind(&patient.insurance_policy_number)
        .bind(&patient.insurance_group_number)
        .bind(patient.consent_given)
        .bind(patient.updated_at)
        .execute(pool)
        .await
        .map_err(|e| MirsError::Database(e.to_string()))?;

        Ok(())
    }

    /// 删除患者。关联影像/检查/报告通过外键级联删除
    pub async fn delete_patient(&self, id: &Uuid) -> Result<bool> {
        let pool = self.pool.pool();

        let result = sqlx::query("DELETE FROM patients WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await
            .map_err(|e| MirsError::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    /// 更新患者最后访问时间
    pub async fn touch_patient_last_accessed(&self, id: &Uuid) -> Result<()> {
        let pool = self.pool.pool();

        sqlx::query("UPDATE patients SET last_accessed = NOW() WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await
            .map_err(|e| MirsError::Database(e.to_string()))?;

        Ok(())
    }

    // ========== 影像相关操作 ==========

    /// 创建影像记录，base64列在文件写入失败或像素渲染缺失时可为空
    pub async fn create_image(
        &self,
        image: &MedicalImage,
        image_b64: Option<&str>,
        thumbnail_b64: Option<&str>,
    ) -> Result<Uuid> {
        let pool = self.pool.pool();

        sqlx::query(r#"
            INSERT INTO medical_images (
                id, patient_id, study_id, series_id, instance_id, modality, body_part,
                study_date, study_time, institution_name, referring_physician,
                dicom_metadata, original_filename, file_size, file_sha256, image_format,
                window_center, window_width, image_data_b64, thumbnail_data_b64,
                uploaded_at, uploaded_by
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16,
                    $17, $18, $19, $20, $21, $22)
            RETURNING id
        "#)
        .bind(image.id)
        .bind(image.patient_id)
        .bind(&image.study_id)
        .bind(&image.series_id)
        .bind(&image.instance_id)
        .bind(&image.modality)
        .bind(&image.body_part)
        .bind(&image.study_date)
        .bind(&image.study_time)
        .bind(&image.institution_name)
        .bind(&image.referring_physician)
        .bind(serde_json::to_string(&image.dicom_metadata)?)
        .bind(&image.original_filename)
        .bind(image.file_size)
        .bind(&image.file_sha256)
        .bind(&image.image_format)
        .bind(image.window_center)
        .bind(image.window_width)
        .bind(image_b64)
        .bind(thumbnail_b64)
        .bind(image.uploaded_at)
        .bind(image.uploaded_by)
        .fetch_one(pool)
        .await
        .map(|row| row.get("id"))
        .map_err(|e| MirsError::Database(e.to_string()))
    }

    /// 获取患者的影像列表（摘要，不含二进制列）
    pub async fn list_images_by_patient(
        &self,
        patient_id: &Uuid,
    ) -> Result<Vec<MedicalImageSummary>> {
        let pool = self.pool.pool();

        let results = sqlx::query_as::<_, DbMedicalImageSummary>(r#"
            SELECT id, patient_id, study_id, modality, body_part, study_date,
                   original_filename, uploaded_at
            FROM medical_images
            WHERE patient_id = $1
            ORDER BY uploaded_at DESC
        "#)
        .bind(patient_id)
        .fetch_all(pool)
        .await
        .map_err(|e| MirsError::Database(e.to_string()))?;

        Ok(results.into_iter().map(MedicalImageSummary::from).collect())
    }

    /// 根据检查标识获取影像列表
    pub async fn list_images_by_study(&self, study_id: &str) -> Result<Vec<MedicalImageSummary>> {
        let pool = self.pool.pool();

        let results = sqlx::query_as::<_, DbMedicalImageSummary>(r#"
            SELECT id, patient_id, study_id, modality, body_part, study_date,
                   original_filename, uploaded_at
            FROM medical_images
            WHERE study_id = $1
            ORDER BY uploaded_at DESC
        "#)
        .bind(study_id)
        .fetch_all(pool)
        .await
        .map_err(|e| MirsError::Database(e.to_string()))?;

        Ok(results.into_iter().map(MedicalImageSummary::from).collect())
    }

    /// 获取影像元数据
    pub async fn get_image(&self, id: &Uuid) -> Result<Option<MedicalImage>> {
        let pool = self.pool.pool();

        let result = sqlx::query_as::<_, DbMedicalImage>(r#"
            SELECT id, patient_id, study_id, series_id, instance_id, modality, body_part,
                   study_date, study_time, institution_name, referring_physician,
                   dicom_metadata, original_filename, file_size, file_sha256, image_format,
                   window_center, window_width, uploaded_at, uploaded_by
            FROM medical_images
            WHERE id = $1
        "#)
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(|e| MirsError::Database(e.to_string()))?;

        Ok(result.map(MedicalImage::from))
    }

    /// 获取影像二进制回退列 (image_data_b64, thumbnail_data_b64)
    pub async fn get_image_binary(
        &self,
        id: &Uuid,
    ) -> Result<Option<(Option<String>, Option<String>)>> {
        let pool = self.pool.pool();

        sqlx::query_as::<_, (Option<String>, Option<String>)>(
            "SELECT image_data_b64, thumbnail_data_b64 FROM medical_images WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(|e| MirsError::Database(e.to_string()))
    }

    /// 删除影像记录
    pub async fn delete_image(&self, id: &Uuid) -> Result<bool> {
        let pool = self.pool.pool();

        let result = sqlx::query("DELETE FROM medical_images WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await
            .map_err(|e| MirsError::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    /// 删除患者的全部影像记录，返回被删影像ID用于清理磁盘文件
    pub async fn delete_images_by_patient(&self, patient_id: &Uuid) -> Result<Vec<Uuid>> {
        let pool = self.pool.pool();

        sqlx::query_scalar::<_, Uuid>(
            "DELETE FROM medical_images WHERE patient_id = $1 RETURNING id",
        )
        .bind(patient_id)
        .fetch_all(pool)
        .await
        .map_err(|e| MirsError::Database(e.to_string()))
    }

    // ========== 设备相关操作 ==========

    /// 创建新设备
    pub async fn create_device(&self, device: &Device) -> Result<Uuid> {
        let pool = self.pool.pool();

        sqlx::query(r#"
            INSERT INTO devices (
                id, name, model, manufacturer, device_type, serial_number,
                installation_date, last_calibration, status, location, specifications,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING id
        "#)
        .bind(device.id)
        .bind(&device.name)
        .bind(&device.model)
        .bind(&device.manufacturer)
        .bind(&device.device_type)
        .bind(&device.serial_number)
        .bind(&device.installation_date)
        .bind(&device.last_calibration)
        .bind(&device.status)
        .bind(&device.location)
        .bind(serde_json::to_string(&device.specifications)?)
        .bind(device.created_at)
        .bind(device.updated_at)
        .fetch_one(pool)
        .await
        .map(|row| row.get("id"))
        .map_err(|e| MirsError::Database(e.to_string()))
    }

    /// 获取所有设备
    pub async fn list_devices(&self) -> Result<Vec<Device>> {
        let pool = self.pool.pool();

        let results =
            sqlx::query_as::<_, DbDevice>("SELECT * FROM devices ORDER BY name")
                .fetch_all(pool)
                .await
                .map_err(|e| MirsError::Database(e.to_string()))?;

        Ok(results.into_iter().map(Device::from).collect())
    }

    /// 根据ID查找设备
    pub async fn get_device(&self, id: &Uuid) -> Result<Option<Device>> {
        let pool = self.pool.pool();

        let result = sqlx::query_as::<_, DbDevice>("SELECT * FROM devices WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
            .map_err(|e| MirsError::Database(e.to_string()))?;

        Ok(result.map(Device::from))
    }

    // ========== 检查相关操作 ==========

    /// 创建新检查
    pub async fn create_examination(&self, exam: &Examination) -> Result<Uuid> {
        let pool = self.pool.pool();

        sqlx::query(r#"
            INSERT INTO examinations (
                id, patient_id, examination_type, examination_date, examination_time,
                device_id, device_name, referring_physician, performing_physician,
                body_part_examined, clinical_indication, examination_protocol,
                contrast_agent, contrast_amount, patient_position, radiation_dose,
                image_count, status, priority, created_at, updated_at, created_by
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16,
                    $17, $18, $19, $20, $21, $22)
            RETURNING id
        "#)
        .bind(exam.id)
        .bind(exam.patient_id)
        .bind(&exam.examination_type)
        .bind(&exam.examination_date)
        .bind(&exam.examination_time)
        .bind(exam.device_id)
        .bind(&exam.device_name)
        .bind(&exam.referring_physician)
        .bind(&exam.performing_physician)
        .bind(&exam.body_part_examined)
        .bind(&exam.clinical_indication)
        .bind(&exam.examination_protocol)
        .bind(&exam.contrast_agent)
        .bind(&exam.contrast_amount)
        .bind(&exam.patient_position)
        .bind(&exam.radiation_dose)
        .bind(exam.image_count)
        .bind(&exam.status)
        .bind(&exam.priority)
        .bind(exam.created_at)
        .bind(exam.updated_at)
        .bind(exam.created_by)
        .fetch_one(pool)
        .await
        .map(|row| row.get("id"))
        .map_err(|e| MirsError::Database(e.to_string()))
    }

    /// 根据ID查找检查
    pub async fn get_examination(&self, id: &Uuid) -> Result<Option<Examination>> {
        let pool = self.pool.pool();

        let result =
            sqlx::query_as::<_, DbExamination>("SELECT * FROM examinations WHERE id = $1")
                .bind(id)
                .fetch_optional(pool)
                .await
                .map_err(|e| MirsError::Database(e.to_string()))?;

        Ok(result.map(Examination::from))
    }

    /// 获取患者的检查详情列表：联查设备信息，统计影像和报告数量
    pub async fn list_examination_details_by_patient(
        &self,
        patient_id: &Uuid,
    ) -> Result<Vec<ExaminationDetails>> {
        let pool = self.pool.pool();

        let results = sqlx::query_as::<_, DbExaminationDetails>(Self::DETAILS_QUERY_BASE)
            .bind(patient_id)
            .fetch_all(pool)
            .await
            .map_err(|e| MirsError::Database(e.to_string()))?;

        Ok(results.into_iter().map(ExaminationDetails::from).collect())
    }

    /// 获取单个检查的详情视图
    pub async fn get_examination_details(&self, id: &Uuid) -> Result<Option<ExaminationDetails>> {
        let pool = self.pool.pool();

        let result = sqlx::query_as::<_, DbExaminationDetails>(Self::DETAILS_QUERY_SINGLE)
            .bind(id)
            .fetch_optional(pool)
            .await
            .map_err(|e| MirsError::Database(e.to_string()))?;

        Ok(result.map(ExaminationDetails::from))
    }

    const DETAILS_QUERY_BASE: &'static str = r#"
        SELECT e.id, e.patient_id, e.examination_type, e.examination_date,
               e.examination_time, e.device_id,
               d.name AS device_name, d.model AS device_model,
               d.manufacturer AS device_manufacturer, d.device_type,
               d.location AS device_location,
               e.referring_physician, e.performing_physician, e.body_part_examined,
               e.clinical_indication, e.examination_protocol, e.contrast_agent,
               (SELECT COUNT(*) FROM medical_images mi
                WHERE mi.study_id = e.id::text) AS image_count,
               e.status, e.priority, e.created_at,
               (SELECT COUNT(*) FROM examination_reports r
                WHERE r.examination_id = e.id) AS report_count
        FROM examinations e
        JOIN devices d ON d.id = e.device_id
        WHERE e.patient_id = $1
        ORDER BY e.examination_date DESC, e.examination_time DESC
    "#;

    const DETAILS_QUERY_SINGLE: &'static str = r#"
        SELECT e.id, e.patient_id, e.examination_type, e.examination_date,
               e.examination_time, e.device_id,
               d.name AS device_name, d.model AS device_model,
               d.manufacturer AS device_manufacturer, d.device_type,
               d.location AS device_location,
               e.referring_physician, e.performing_physician, e.body_part_examined,
               e.clinical_indication, e.examination_protocol, e.contrast_agent,
               (SELECT COUNT(*) FROM medical_images mi
                WHERE mi.study_id = e.id::text) AS image_count,
               e.status, e.priority, e.created_at,
               (SELECT COUNT(*) FROM examination_reports r
                WHERE r.examination_id = e.id) AS report_count
        FROM examinations e
        JOIN devices d ON d.id = e.device_id
        WHERE e.id = $1
    "#;

    // ========== 报告相关操作 ==========

    /// 创建检查报告
    pub async fn create_report(&self, report: &ExaminationReport) -> Result<Uuid> {
        let pool = self.pool.pool();

        sqlx::query(r#"
            INSERT INTO examination_reports (
                id, examination_id, report_type, report_status, findings, impression,
                recommendations, report_date, report_time, reporting_physician,
                dictated_by, transcribed_by, technical_quality, limitations,
                comparison_studies, created_at, updated_at, created_by
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16,
                    $17, $18)
            RETURNING id
        "#)
        .bind(report.id)
        .bind(report.examination_id)
        .bind(&report.report_type)
        .bind(&report.report_status)
        .bind(&report.findings)
        .bind(&report.impression)
        .bind(&report.recommendations)
        .bind(&report.report_date)
        .bind(&report.report_time)
        .bind(&report.reporting_physician)
        .bind(&report.dictated_by)
        .bind(&report.transcribed_by)
        .bind(&report.technical_quality)
        .bind(&report.limitations)
        .bind(&report.comparison_studies)
        .bind(report.created_at)
        .bind(report.updated_at)
        .bind(report.created_by)
        .fetch_one(pool)
        .await
        .map(|row| row.get("id"))
        .map_err(|e| MirsError::Database(e.to_string()))
    }

    /// 获取检查的全部报告
    pub async fn list_reports_by_examination(
        &self,
        examination_id: &Uuid,
    ) -> Result<Vec<ExaminationReport>> {
        let pool = self.pool.pool();

        let results = sqlx::query_as::<_, DbExaminationReport>(r#"
            SELECT * FROM examination_reports
            WHERE examination_id = $1
            ORDER BY created_at DESC
        "#)
        .bind(examination_id)
        .fetch_all(pool)
        .await
        .map_err(|e| MirsError::Database(e.to_string()))?;

        Ok(results.into_iter().map(ExaminationReport::from).collect())
    }

    // ========== 审计日志操作 ==========

    /// 写入审计日志条目
    pub async fn insert_audit_entry(&self, entry: &AuditEntry) -> Result<()> {
        let pool = self.pool.pool();

        sqlx::query(r#"
            INSERT INTO audit_logs (id, action, resource_type, resource_id, user_id, username, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#)
        .bind(entry.id)
        .bind(&entry.action)
        .bind(&entry.resource_type)
        .bind(&entry.resource_id)
        .bind(entry.user_id)
        .bind(&entry.username)
        .bind(entry.created_at)
        .execute(pool)
        .await
        .map_err(|e| MirsError::Database(e.to_string()))?;

        Ok(())
    }

    /// 获取最近的审计日志
    pub async fn list_audit_entries(&self, limit: i64) -> Result<Vec<AuditEntry>> {
        let pool = self.pool.pool();

        let results = sqlx::query_as::<_, DbAuditEntry>(
            "SELECT * FROM audit_logs ORDER BY created_at DESC LIMIT $1",
        )
        .bind(limit)
        .fetch_all(pool)
        .await
        .map_err(|e| MirsError::Database(e.to_string()))?;

        Ok(results.into_iter().map(AuditEntry::from).collect())
    }
}
