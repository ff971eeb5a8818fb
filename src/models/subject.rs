use phf::phf_map;

/// USMLE 学科枚举
///
/// `Other` 用于兜底：模型给出无法识别的学科时归入此类。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub enum UsmleSubject {
    // Step 1
    Anatomy,
    Physiology,
    Biochemistry,
    Pharmacology,
    MicrobiologyImmunology,
    Pathology,
    BehavioralScienceBiostatistics,
    Genetics,
    // Step 2
    InternalMedicine,
    Surgery,
    Pediatrics,
    ObstetricsGynecology,
    Psychiatry,
    Neurology,
    EmergencyMedicine,
    FamilyMedicine,
    Radiology,
    Oncology,
    /// 兜底
    Other,
}

/// 小写别名 -> 学科
static SUBJECT_ALIASES: phf::Map<&'static str, UsmleSubject> = phf_map! {
    "anatomy" => UsmleSubject::Anatomy,
    "physiology" => UsmleSubject::Physiology,
    "biochemistry" => UsmleSubject::Biochemistry,
    "pharmacology" => UsmleSubject::Pharmacology,
    "microbiology & immunology" => UsmleSubject::MicrobiologyImmunology,
    "microbiology and immunology" => UsmleSubject::MicrobiologyImmunology,
    "microbiology" => UsmleSubject::MicrobiologyImmunology,
    "immunology" => UsmleSubject::MicrobiologyImmunology,
    "pathology" => UsmleSubject::Pathology,
    "behavioral science & biostatistics" => UsmleSubject::BehavioralScienceBiostatistics,
    "behavioral science and biostatistics" => UsmleSubject::BehavioralScienceBiostatistics,
    "behavioral science" => UsmleSubject::BehavioralScienceBiostatistics,
    "biostatistics" => UsmleSubject::BehavioralScienceBiostatistics,
    "genetics" => UsmleSubject::Genetics,
    "internal medicine" => UsmleSubject::InternalMedicine,
    "medicine" => UsmleSubject::InternalMedicine,
    "surgery" => UsmleSubject::Surgery,
    "pediatrics" => UsmleSubject::Pediatrics,
    "paediatrics" => UsmleSubject::Pediatrics,
    "obstetrics & gynecology" => UsmleSubject::ObstetricsGynecology,
    "obstetrics and gynecology" => UsmleSubject::ObstetricsGynecology,
    "ob/gyn" => UsmleSubject::ObstetricsGynecology,
    "obgyn" => UsmleSubject::ObstetricsGynecology,
    "psychiatry" => UsmleSubject::Psychiatry,
    "neurology" => UsmleSubject::Neurology,
    "emergency medicine" => UsmleSubject::EmergencyMedicine,
    "family medicine" => UsmleSubject::FamilyMedicine,
    "radiology" => UsmleSubject::Radiology,
    "oncology" => UsmleSubject::Oncology,
    "other" => UsmleSubject::Other,
};

impl UsmleSubject {
    /// 全部学科（不含 Other），用于生成提示词
    pub const ALL: [UsmleSubject; 18] = [
        UsmleSubject::Anatomy,
        UsmleSubject::Physiology,
        UsmleSubject::Biochemistry,
        UsmleSubject::Pharmacology,
        UsmleSubject::MicrobiologyImmunology,
        UsmleSubject::Pathology,
        UsmleSubject::BehavioralScienceBiostatistics,
        UsmleSubject::Genetics,
        UsmleSubject::InternalMedicine,
        UsmleSubject::Surgery,
        UsmleSubject::Pediatrics,
        UsmleSubject::ObstetricsGynecology,
        UsmleSubject::Psychiatry,
        UsmleSubject::Neurology,
        UsmleSubject::EmergencyMedicine,
        UsmleSubject::FamilyMedicine,
        UsmleSubject::Radiology,
        UsmleSubject::Oncology,
    ];

    /// 获取标准名称（写入 CSV 的值）
    pub fn name(self) -> &'static str {
        match self {
            UsmleSubject::Anatomy => "Anatomy",
            UsmleSubject::Physiology => "Physiology",
            UsmleSubject::Biochemistry => "Biochemistry",
            UsmleSubject::Pharmacology => "Pharmacology",
            UsmleSubject::MicrobiologyImmunology => "Microbiology & Immunology",
            UsmleSubject::Pathology => "Pathology",
            UsmleSubject::BehavioralScienceBiostatistics => "Behavioral Science & Biostatistics",
            UsmleSubject::Genetics => "Genetics",
            UsmleSubject::InternalMedicine => "Internal Medicine",
            UsmleSubject::Surgery => "Surgery",
            UsmleSubject::Pediatrics => "Pediatrics",
            UsmleSubject::ObstetricsGynecology => "Obstetrics & Gynecology",
            UsmleSubject::Psychiatry => "Psychiatry",
            UsmleSubject::Neurology => "Neurology",
            UsmleSubject::EmergencyMedicine => "Emergency Medicine",
            UsmleSubject::FamilyMedicine => "Family Medicine",
            UsmleSubject::Radiology => "Radiology",
            UsmleSubject::Oncology => "Oncology",
            UsmleSubject::Other => "Other",
        }
    }

    /// 所属考试阶段
    pub fn step(self) -> Option<u8> {
        match self {
            UsmleSubject::Anatomy
            | UsmleSubject::Physiology
            | UsmleSubject::Biochemistry
            | UsmleSubject::Pharmacology
            | UsmleSubject::MicrobiologyImmunology
            | UsmleSubject::Pathology
            | UsmleSubject::BehavioralScienceBiostatistics
            | UsmleSubject::Genetics => Some(1),
            UsmleSubject::Other => None,
            _ => Some(2),
        }
    }

    /// 尝试从字符串解析学科（忽略大小写与多余空白的精确匹配）
    pub fn from_str(s: &str) -> Option<Self> {
        let key = s.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
        SUBJECT_ALIASES.get(key.as_str()).copied()
    }

    /// 模型输出的学科归一化：无法识别的一律归入 `Other`
    pub fn clamp(s: &str) -> Self {
        if let Some(subject) = Self::from_str(s) {
            return subject;
        }

        // 模糊匹配，如 "Radiology / Imaging"
        let lower = s.to_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|subject| lower.contains(&subject.name().to_lowercase()))
            .unwrap_or(UsmleSubject::Other)
    }

    /// 模型未给出学科时，根据图注关键词推断
    pub fn infer_from_caption(caption: &str) -> Self {
        let lower = caption.to_lowercase();
        let has_any = |words: &[&str]| {
            lower
                .split(|c: char| !c.is_alphanumeric())
                .any(|token| words.contains(&token))
        };

        if has_any(&["ct", "mri", "ultrasound", "radiograph", "imaging", "scan"]) {
            UsmleSubject::Radiology
        } else if has_any(&["pathology", "biopsy", "histology", "tissue"]) {
            UsmleSubject::Pathology
        } else if has_any(&["surgery", "surgical", "operative"]) {
            UsmleSubject::Surgery
        } else if has_any(&["pediatric", "child", "infant"]) {
            UsmleSubject::Pediatrics
        } else {
            UsmleSubject::InternalMedicine
        }
    }
}

impl std::fmt::Display for UsmleSubject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_subject_name_round_trips() {
        for subject in UsmleSubject::ALL {
            assert_eq!(UsmleSubject::from_str(subject.name()), Some(subject));
        }
        assert_eq!(UsmleSubject::from_str("Other"), Some(UsmleSubject::Other));
    }

    #[test]
    fn test_clamp_unknown_to_other() {
        assert_eq!(UsmleSubject::clamp("  internal   MEDICINE "), UsmleSubject::InternalMedicine);
        assert_eq!(UsmleSubject::clamp("Radiology / Imaging"), UsmleSubject::Radiology);
        assert_eq!(UsmleSubject::clamp("Dermatology"), UsmleSubject::Other);
        assert_eq!(UsmleSubject::clamp(""), UsmleSubject::Other);
    }

    #[test]
    fn test_infer_from_caption() {
        assert_eq!(
            UsmleSubject::infer_from_caption("Axial CT of the abdomen"),
            UsmleSubject::Radiology
        );
        assert_eq!(
            UsmleSubject::infer_from_caption("Biopsy specimen, H&E stain"),
            UsmleSubject::Pathology
        );
        // "act" 不应被当作 "ct"
        assert_eq!(
            UsmleSubject::infer_from_caption("Exact timeline of symptoms"),
            UsmleSubject::InternalMedicine
        );
    }

    #[test]
    fn test_steps() {
        assert_eq!(UsmleSubject::Genetics.step(), Some(1));
        assert_eq!(UsmleSubject::Oncology.step(), Some(2));
        assert_eq!(UsmleSubject::Other.step(), None);
    }
}
